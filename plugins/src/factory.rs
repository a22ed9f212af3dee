use ostbuild_core::config::AppConfig;
use ostbuild_core::error::ResolutionError;
use ostbuild_core::task::TaskRegistry;

use crate::tasks::{GroupTask, ShellTask};

/// Registry of every built-in task kind, configured from `cfg`.
///
/// Registration order is resolution order.
pub fn builtin_registry(cfg: &AppConfig) -> Result<TaskRegistry, ResolutionError> {
    let mut registry = TaskRegistry::new();
    registry.register(ShellTask::new(cfg.shell.clone())?);
    registry.register(GroupTask::new(cfg.groups.clone())?);
    tracing::debug!(
        definitions = registry.len(),
        shell = cfg.shell.len(),
        groups = cfg.groups.len(),
        "built task registry"
    );
    Ok(registry)
}
