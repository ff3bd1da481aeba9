use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::models::{QuorumTaskId, TaskFlags};

/// Internal callback method bound to every quorum sub-task. Finalizations
/// addressed to the service handle with this method are routed back into the
/// quorum aggregator instead of an external callback target.
pub const QUORUM_RESULT_METHOD: &str = "record_quorum_result";

#[derive(Clone, Debug, PartialEq)]
pub struct QuorumRequest {
    pub variants: Vec<String>,
    pub quorum_threshold: Option<u32>,
    pub redundancy: u32,
    pub config_ref: String,
    pub inputs: BTreeMap<String, String>,
    pub callback_method: String,
    pub callback_args: Value,
    pub flags: TaskFlags,
}

/// Result slots for one quorum task, filled in sub-task completion order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QuorumLog {
    slots: Vec<String>,
}

impl QuorumLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[String] {
        &self.slots
    }

    /// Matching sub-results for `value`, counting the candidate itself.
    pub fn matches_for(&self, value: &str) -> u32 {
        1 + self.slots.iter().filter(|slot| *slot == value).count() as u32
    }

    pub fn record(&mut self, value: String) {
        self.slots.push(value);
    }
}

pub fn default_threshold(variant_count: u32) -> u32 {
    variant_count / 2 + 1
}

pub(crate) fn bind_quorum_args(quorum_task_id: QuorumTaskId) -> Value {
    json!({ "quorum_task_id": quorum_task_id.0 })
}

pub(crate) fn bound_quorum_id(args: &Value) -> Option<QuorumTaskId> {
    args.get("quorum_task_id")
        .and_then(Value::as_u64)
        .map(QuorumTaskId)
}
