use std::path::PathBuf;

use thiserror::Error;

use super::{ResolutionError, TaskExecutionError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHome,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Errors raised on the child side of a subprocess-isolated task.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Task(#[from] TaskExecutionError),
    #[error("invalid {var}: {source}")]
    InvalidInputs {
        var: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to write result: {0}")]
    WriteResult(#[source] std::io::Error),
    #[error("result fd {0} is not usable")]
    BadResultFd(i32),
}
