//! Graph scheduler: dependency expansion, ordering and bounded dispatch.

mod cancel;
mod engine;
mod graph;
mod progress;
mod types;

pub use cancel::CancelToken;
pub use engine::{Scheduler, DEFAULT_MAX_CONCURRENT};
pub use graph::{format_cycle_path, topological_order};
pub use progress::ProgressMonitor;
pub use types::{CompletedTask, TaskInstance};
