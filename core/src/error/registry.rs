use thiserror::Error;

/// A task name could not be mapped onto a registered definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No task definition matches {0}")]
    NotFound(String),

    #[error("invalid task name '{0}'")]
    InvalidName(String),

    #[error("invalid task pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
