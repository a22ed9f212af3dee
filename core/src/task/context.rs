use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::scheduler::CancelToken;
use crate::unit::TaskWorkspace;

/// Parameters of one task instance: pattern captures plus caller-supplied values.
pub type TaskInputs = serde_json::Map<String, Value>;

/// Everything a task body can see while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub name: String,
    pub inputs: TaskInputs,
    /// Directory the body works in. For subprocess tasks this is the version scratch directory.
    pub workdir: PathBuf,
    /// Build root; task history lives under `<root>/tasks`.
    pub root: PathBuf,
    /// Results of completed dependencies. Empty on the child side of a subprocess task.
    pub dependency_results: HashMap<String, Value>,
    pub cancel: CancelToken,
}

impl TaskContext {
    /// Newest `successful/<version>` directory of another task, if it has ever succeeded.
    pub fn latest_successful(&self, task: &str) -> Option<PathBuf> {
        TaskWorkspace::new(self.root.join("tasks"), task)
            .ok()?
            .latest_successful()
            .ok()
            .flatten()
    }
}
