use serde::{Deserialize, Serialize};

use crate::models::{Handle, QuorumTaskId, TaskId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterChange {
    Added,
    Removed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    TaskCreated {
        task_id: TaskId,
        redundancy: u32,
    },
    RosterChanged {
        change: RosterChange,
        worker: Handle,
    },
    TaskFinalized {
        task_id: TaskId,
    },
    QuorumTaskCreated {
        quorum_task_id: QuorumTaskId,
        variant_count: u32,
        quorum_threshold: u32,
    },
    QuorumReached {
        quorum_task_id: QuorumTaskId,
    },
}
