pub mod content;
pub mod prompt;
pub mod provider;
pub mod runtime;
pub mod schedule;

pub use content::{ContentResult, ContentStore, MemoryContentStore, content_hash, is_content_hash};
pub use prompt::{ResolvedConfig, extract_result_tag, parse_config, render_prompt};
pub use provider::{CompletionRequest, ComputeFuture, ComputeProvider, ComputeResult};
pub use runtime::{Worker, WorkerConfig};
pub use schedule::{DEFAULT_BASE_INTERVAL, stagger_delay};
