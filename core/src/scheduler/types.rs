use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::TaskExecutionError;
use crate::task::{TaskDefinition, TaskInputs};

/// A resolved task waiting in the pending list.
pub struct TaskInstance {
    pub name: String,
    /// Pattern captures merged with `extra_inputs`.
    pub inputs: TaskInputs,
    /// Caller-supplied inputs, forwarded to the child of a subprocess task.
    pub extra_inputs: TaskInputs,
    pub definition: Arc<dyn TaskDefinition>,
    pub dependencies: Vec<String>,
    /// Dependencies that have not completed yet.
    pub waiting: BTreeSet<String>,
}

impl TaskInstance {
    pub fn is_ready(&self) -> bool {
        self.waiting.is_empty()
    }
}

impl fmt::Debug for TaskInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInstance")
            .field("name", &self.name)
            .field("kind", &self.definition.kind())
            .field("waiting", &self.waiting)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CompletedTask {
    pub name: String,
    pub result: Value,
    pub duration: Duration,
}

/// Message a finished unit sends back to the scheduler loop.
#[derive(Debug)]
pub(crate) struct Completion {
    pub name: String,
    pub result: Result<Value, TaskExecutionError>,
    pub duration: Duration,
}
