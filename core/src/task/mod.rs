//! Task definitions and the registry that maps task names onto them.
//!
//! A task name such as `shell/compile` is matched against each registered
//! [`TaskPattern`] in registration order; the first definition whose pattern
//! matches wins and its named capture groups become the task's inputs.

mod context;
mod definition;
mod pattern;
mod registry;

pub use context::{TaskContext, TaskInputs};
pub use definition::{Isolation, SubprocessPolicy, TaskDefinition};
pub use pattern::TaskPattern;
pub use registry::{validate_task_name, Resolved, TaskRegistry};
