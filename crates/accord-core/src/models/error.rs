use thiserror::Error;

use crate::models::{Handle, TaskId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    Validation,
    Authorization,
    DuplicateSubmission,
    InsufficientPayment,
    ConfigResolution,
    NoConsensus,
    NotFound,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<TaskId>,
    pub worker: Option<Handle>,
    pub kind: CoreErrorKind,
    pub message: String,
}
