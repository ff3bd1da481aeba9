use std::future::Future;
use std::pin::Pin;

use crate::models::CoreError;

pub type ComputeResult<T> = Result<T, CoreError>;

pub type ComputeFuture = Pin<Box<dyn Future<Output = ComputeResult<String>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
}

/// Opaque third-party compute. A call may suspend for an unbounded external
/// duration and there is no cancellation once started; workers only skip
/// wasted work through their liveness re-checks around it.
pub trait ComputeProvider: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> ComputeFuture;
}
