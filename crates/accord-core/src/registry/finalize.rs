use serde_json::Value;

use crate::models::{CallbackSpec, CoreError, QuorumTaskId, Task, TaskId};

pub type CallbackResult = Result<(), CoreError>;

/// Receiver side of a task callback. Requesters register one target per
/// handle; the dispatcher invokes it failure-tolerantly after the task's
/// aggregation state has been cleared.
pub trait CallbackTarget: Send + Sync {
    fn invoke(&self, method: &str, args: &Value, result: &str) -> CallbackResult;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FinalizedSource {
    Task(TaskId),
    Quorum(QuorumTaskId),
}

/// Proof that a task's aggregation state has been cleared. Only the
/// registry's lock-scoped finalize step constructs one, so a callback can
/// never run ahead of the state mutation it follows.
#[derive(Clone, Debug, PartialEq)]
pub struct Finalization {
    pub(crate) source: FinalizedSource,
    pub(crate) callback: CallbackSpec,
    pub(crate) result: String,
}

impl Finalization {
    pub(crate) fn for_task(task: Task, result: String) -> Self {
        Self {
            source: FinalizedSource::Task(task.id),
            callback: task.callback,
            result,
        }
    }

    pub(crate) fn for_quorum(
        quorum_task_id: QuorumTaskId,
        callback: CallbackSpec,
        result: String,
    ) -> Self {
        Self {
            source: FinalizedSource::Quorum(quorum_task_id),
            callback,
            result,
        }
    }
}
