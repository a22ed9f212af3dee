use thiserror::Error;

use super::ResolutionError;

/// A version directory name did not match `YYYYMMDD.N`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version '{0}'")]
pub struct VersionParseError(pub String);

/// Failure of one execution unit. Carries the diagnostic text surfaced to the user.
#[derive(Error, Debug)]
pub enum TaskExecutionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("process {0}")]
    Exited(String),

    #[error("result stream closed without valid JSON: {0}")]
    ResultStream(String),

    #[error("unexpected result shape: {0}")]
    ResultShape(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Version(#[from] VersionParseError),

    #[error("{0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskExecutionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("While executing {task}: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: TaskExecutionError,
    },

    #[error("no runnable task among pending: {}", .0.join(", "))]
    Stalled(Vec<String>),

    #[error("run cancelled")]
    Cancelled,
}

impl SchedulerError {
    /// True for errors raised while building the graph, before anything ran.
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Self::Resolution(_) | Self::CircularDependency(_))
    }
}
