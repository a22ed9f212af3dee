use async_trait::async_trait;
use serde_json::Value;

use super::{TaskContext, TaskInputs, TaskPattern};
use crate::error::{ResolutionError, TaskExecutionError};

/// History retention and output capture for a subprocess-isolated task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubprocessPolicy {
    /// Most-recent `successful/` versions kept after each run.
    pub retain_success: usize,
    /// Most-recent `failed/` versions kept after each run.
    pub retain_failed: usize,
    /// Capture stdout+stderr into `output.txt`; otherwise only stderr into `errors.txt`.
    pub preserve_output: bool,
}

impl Default for SubprocessPolicy {
    fn default() -> Self {
        Self {
            retain_success: 5,
            retain_failed: 1,
            preserve_output: true,
        }
    }
}

/// Which execution unit runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Run the body inside the scheduler process.
    InProcess,
    /// Run the body in a child `run-task` process with versioned history.
    Subprocess(SubprocessPolicy),
}

/// A registered task kind.
#[async_trait]
pub trait TaskDefinition: Send + Sync {
    /// Short kind name, used for listings and logs.
    fn kind(&self) -> &str;

    fn pattern(&self) -> &TaskPattern;

    /// Names of the tasks that must complete before this one starts.
    fn dependencies(&self, _inputs: &TaskInputs) -> Result<Vec<String>, ResolutionError> {
        Ok(Vec::new())
    }

    fn isolation(&self, _inputs: &TaskInputs) -> Isolation {
        Isolation::Subprocess(SubprocessPolicy::default())
    }

    /// The task body. For subprocess-isolated tasks this runs in the child.
    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError>;
}
