use serde::{Deserialize, Serialize};

use crate::models::{CallbackSpec, Handle};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuorumTaskId(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuorumTask {
    pub id: QuorumTaskId,
    pub requester: Handle,
    pub callback: CallbackSpec,
    pub quorum_threshold: u32,
    pub variant_count: u32,
}
