use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Handle;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    NotFound,
    Ok,
    AlreadySubmitted,
    NoConsensus,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmissionSlot {
    /// 1-based, assigned in arrival order.
    pub slot_index: u32,
    pub worker: Handle,
    pub value: String,
}

/// Per-task submission state: an arrival-ordered slot log plus a worker
/// index for duplicate detection. Slots are append-only; a worker's entry is
/// never overwritten.
#[derive(Clone, Debug, Default)]
pub struct SubmissionLog {
    slots: Vec<SubmissionSlot>,
    by_worker: HashMap<Handle, usize>,
}

impl SubmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[SubmissionSlot] {
        &self.slots
    }

    pub fn has_submission_from(&self, worker: &Handle) -> bool {
        self.by_worker.contains_key(worker)
    }

    /// Matching submissions for `value`, counting the candidate itself.
    pub fn matches_for(&self, value: &str) -> u32 {
        1 + self.slots.iter().filter(|slot| slot.value == value).count() as u32
    }

    pub fn record(&mut self, worker: Handle, value: String) -> u32 {
        let slot_index = self.slots.len() as u32 + 1;
        self.by_worker.insert(worker.clone(), self.slots.len());
        self.slots.push(SubmissionSlot {
            slot_index,
            worker,
            value,
        });
        slot_index
    }

    /// Classification for a worker probing whether work is still wanted.
    /// A full log means no value reached the threshold before the slots ran
    /// out, which is terminal for the task.
    pub fn status_for(&self, worker: &Handle, total_workers: usize) -> SubmissionStatus {
        if self.has_submission_from(worker) {
            return SubmissionStatus::AlreadySubmitted;
        }
        if self.slots.len() >= total_workers {
            return SubmissionStatus::NoConsensus;
        }
        SubmissionStatus::Ok
    }
}
