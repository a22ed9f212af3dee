#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ostbuild_core::error::{ResolutionError, TaskExecutionError};
use ostbuild_core::task::{
    Isolation, SubprocessPolicy, TaskContext, TaskDefinition, TaskInputs, TaskPattern,
};
use ostbuild_core::unit::{DriverSpec, ExecutionEnv};
use serde_json::{json, Value};

/// Shared observations of a [`Recorder`] run.
#[derive(Default)]
pub struct Journal {
    events: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Journal {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("no event {event}"))
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// In-process `t/<id>` tasks with scripted dependencies, delays and failures.
pub struct Recorder {
    pattern: TaskPattern,
    deps: HashMap<String, Vec<String>>,
    delays: HashMap<String, u64>,
    failing: HashSet<String>,
    pub journal: Arc<Journal>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            pattern: TaskPattern::new(r"t/(?P<id>[a-z0-9_]+)").unwrap(),
            deps: HashMap::new(),
            delays: HashMap::new(),
            failing: HashSet::new(),
            journal: Arc::new(Journal::default()),
        }
    }

    pub fn depends(mut self, task: &str, on: &[&str]) -> Self {
        self.deps
            .insert(task.to_string(), on.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn delay(mut self, task: &str, ms: u64) -> Self {
        self.delays.insert(task.to_string(), ms);
        self
    }

    pub fn fails(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

#[async_trait]
impl TaskDefinition for Recorder {
    fn kind(&self) -> &str {
        "recorder"
    }

    fn pattern(&self) -> &TaskPattern {
        &self.pattern
    }

    fn dependencies(&self, inputs: &TaskInputs) -> Result<Vec<String>, ResolutionError> {
        let id = inputs["id"].as_str().unwrap_or_default();
        Ok(self.deps.get(&format!("t/{id}")).cloned().unwrap_or_default())
    }

    fn isolation(&self, _inputs: &TaskInputs) -> Isolation {
        Isolation::InProcess
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let journal = &self.journal;
        let now = journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        journal.peak.fetch_max(now, Ordering::SeqCst);
        journal.events.lock().unwrap().push(format!("start:{}", ctx.name));

        let ms = self.delays.get(&ctx.name).copied().unwrap_or(5);
        tokio::time::sleep(Duration::from_millis(ms)).await;

        journal.events.lock().unwrap().push(format!("end:{}", ctx.name));
        journal.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&ctx.name) {
            return Err(TaskExecutionError::Failed(format!("{} failed", ctx.name)));
        }
        let mut deps: Vec<&String> = ctx.dependency_results.keys().collect();
        deps.sort();
        Ok(json!({ "name": ctx.name, "deps": deps }))
    }
}

/// Subprocess-isolated `p/<id>` tasks; their bodies live in the driver script.
pub struct ChildTask {
    pattern: TaskPattern,
    pub policy: SubprocessPolicy,
}

impl ChildTask {
    pub fn new(policy: SubprocessPolicy) -> Self {
        Self {
            pattern: TaskPattern::new(r"p/(?P<id>[a-z0-9_]+)").unwrap(),
            policy,
        }
    }
}

#[async_trait]
impl TaskDefinition for ChildTask {
    fn kind(&self) -> &str {
        "child"
    }

    fn pattern(&self) -> &TaskPattern {
        &self.pattern
    }

    fn isolation(&self, _inputs: &TaskInputs) -> Isolation {
        Isolation::Subprocess(self.policy)
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        Err(TaskExecutionError::Failed("runs in the driver script".into()))
    }
}

/// Driver standing in for `ostbuild run-task <name> <fd>`.
pub const DRIVER_SCRIPT: &str = r#"#!/bin/sh
case "$2" in
  p/ok)
    echo "hello from $2"
    printf '{"result":{"x":1}}' > /dev/fd/$3 ;;
  p/fail)
    echo "broken" >&2
    exit 1 ;;
  p/empty)
    printf '{}' > /dev/fd/$3 ;;
  p/garbage)
    printf 'not json' > /dev/fd/$3 ;;
  p/inputs)
    printf '{"result":%s}' "$OSTBUILD_TASK_INPUTS" > /dev/fd/$3 ;;
  p/env)
    printf '{"result":{"workdir":"%s","cwd":"%s"}}' "$OSTBUILD_WORKDIR" "$(pwd)" > /dev/fd/$3 ;;
  *)
    echo "unknown task $2" >&2
    exit 2 ;;
esac
"#;

pub fn write_driver(dir: &Path) -> PathBuf {
    let path = dir.join("driver.sh");
    std::fs::write(&path, DRIVER_SCRIPT).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Build root under `dir` whose driver is `program`.
pub fn env_with_driver(dir: &Path, program: PathBuf) -> Arc<ExecutionEnv> {
    let root = dir.join("build");
    std::fs::create_dir_all(&root).unwrap();
    Arc::new(ExecutionEnv::new(
        root,
        DriverSpec {
            program,
            config: None,
        },
    ))
}

pub fn script_env(dir: &Path) -> Arc<ExecutionEnv> {
    let driver = write_driver(dir);
    env_with_driver(dir, driver)
}

pub fn version_names(dir: &Path) -> Vec<String> {
    ostbuild_core::unit::load_versions(dir)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect()
}
