use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Amount, Handle};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskFlags {
    pub extract_result_tag: bool,
    pub store_result_offchain: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallbackSpec {
    pub receiver: Handle,
    pub method: String,
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub requester: Handle,
    pub payment: Amount,
    pub variant: Option<String>,
    pub config_ref: String,
    pub inputs: BTreeMap<String, String>,
    pub callback: CallbackSpec,
    pub redundancy: u32,
    pub flags: TaskFlags,
}
