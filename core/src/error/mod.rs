#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;
pub mod registry;

pub use error::{ConfigError, DriverError};
pub use executor::{SchedulerError, TaskExecutionError, VersionParseError};
pub use registry::ResolutionError;
