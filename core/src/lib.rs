//! Task-execution core of the ostbuild pipeline: a registry of task
//! definitions, a dependency-graph scheduler, and execution units that run
//! each task in-process or in a child with a versioned on-disk history.

#[cfg(not(unix))]
compile_error!("ostbuild-core relies on inherited pipe descriptors and only supports unix");

pub mod config;
pub mod driver;
pub mod error;
pub mod scheduler;
pub mod task;
pub mod unit;

pub use scheduler::{CancelToken, Scheduler};
pub use task::{TaskDefinition, TaskRegistry};
pub use unit::{ExecutionEnv, ExecutionUnit};
