//! Execution units: the per-task runners the scheduler dispatches.
//!
//! ```text
//! TaskDefinition::isolation()
//!   ├─ InProcess          → InProcessUnit  → definition.execute(ctx)
//!   └─ Subprocess(policy) → SubprocessUnit → tasks/<name>/<version>/ scratch
//!                                            → `<driver> run-task <name> <fd>`
//!                                            → exit status + result pipe
//!                                            → successful/ or failed/, pruned
//! ```

mod in_process;
pub mod protocol;
mod subprocess;
mod version;
mod workspace;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{ConfigError, TaskExecutionError};
use crate::scheduler::CancelToken;
use crate::task::{Isolation, TaskContext, TaskDefinition, TaskInputs};

pub use in_process::InProcessUnit;
pub use subprocess::SubprocessUnit;
pub use version::{today_utc, VersionRecord};
pub use workspace::{load_versions, prune, Outcome, Scratch, TaskWorkspace, FAILED_DIR, SUCCESSFUL_DIR};

/// How to start the out-of-process driver.
#[derive(Debug, Clone)]
pub struct DriverSpec {
    pub program: PathBuf,
    /// Config file the child should load, forwarded through `OSTBUILD_CONFIG`.
    pub config: Option<PathBuf>,
}

/// Filesystem and driver settings shared by every unit of one scheduler run.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub root: PathBuf,
    pub tasks_dir: PathBuf,
    pub driver: DriverSpec,
}

impl ExecutionEnv {
    pub fn new(root: impl Into<PathBuf>, driver: DriverSpec) -> Self {
        let root = root.into();
        Self {
            tasks_dir: root.join("tasks"),
            root,
            driver,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let program = match cfg.driver.program.as_deref() {
            Some(p) if !p.trim().is_empty() => PathBuf::from(shellexpand::tilde(p).into_owned()),
            _ => std::env::current_exe().map_err(|e| ConfigError::InvalidValue {
                key: "driver.program",
                value: e.to_string(),
            })?,
        };
        Ok(Self::new(
            cfg.workdir_path()?,
            DriverSpec {
                program,
                config: cfg.source.clone(),
            },
        ))
    }
}

/// A unit of work ready to run, tagged by isolation.
pub enum ExecutionUnit {
    InProcess(InProcessUnit),
    Subprocess(SubprocessUnit),
}

impl ExecutionUnit {
    /// Build the unit the definition asks for.
    ///
    /// `inputs` are the full inputs of the instance; `extra_inputs` is the
    /// caller-supplied subset the child cannot re-derive from the name.
    pub fn for_task(
        name: &str,
        definition: Arc<dyn TaskDefinition>,
        inputs: TaskInputs,
        extra_inputs: TaskInputs,
        dependency_results: HashMap<String, Value>,
        env: Arc<ExecutionEnv>,
        cancel: CancelToken,
    ) -> Self {
        match definition.isolation(&inputs) {
            Isolation::InProcess => Self::InProcess(InProcessUnit::new(
                definition,
                TaskContext {
                    name: name.to_string(),
                    inputs,
                    workdir: env.root.clone(),
                    root: env.root.clone(),
                    dependency_results,
                    cancel,
                },
            )),
            Isolation::Subprocess(policy) => {
                Self::Subprocess(SubprocessUnit::new(name, extra_inputs, policy, env))
            }
        }
    }

    pub async fn run(self) -> Result<Value, TaskExecutionError> {
        match self {
            Self::InProcess(unit) => unit.run().await,
            Self::Subprocess(unit) => unit.run().await,
        }
    }
}
