use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the build tree. Task history lives under `<workdir>/tasks`.
    #[serde(default = "default_workdir")]
    pub workdir: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    /// `shell/<name>` task bodies, keyed by name.
    #[serde(default)]
    pub shell: BTreeMap<String, ShellTaskConfig>,

    /// `group/<name>` members, keyed by name.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,

    /// File this config was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_workdir() -> String {
    ".".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
            driver: DriverConfig::default(),
            shell: BTreeMap::new(),
            groups: BTreeMap::new(),
            source: None,
        }
    }
}

impl AppConfig {
    /// Absolute workdir with `~` expanded.
    pub fn workdir_path(&self) -> Result<PathBuf, ConfigError> {
        let expanded = shellexpand::tilde(&self.workdir).into_owned();
        std::path::absolute(&expanded).map_err(|_| ConfigError::InvalidValue {
            key: "workdir",
            value: self.workdir.clone(),
        })
    }

    pub fn tasks_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.workdir_path()?.join("tasks"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "ostbuild_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Show progress bars while tasks run.
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Status refresh period for the progress display.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_progress() -> bool {
    true
}

fn default_status_interval_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            progress: default_progress(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Program invoked as `<program> run-task <name> <fd>`. Defaults to the running executable.
    #[serde(default)]
    pub program: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellTaskConfig {
    pub command: String,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub retain_success: Option<usize>,

    #[serde(default)]
    pub retain_failed: Option<usize>,

    #[serde(default)]
    pub preserve_output: Option<bool>,
}
