use std::io::Write;

use anyhow::Context;
use ostbuild_core::config::AppConfig;
use ostbuild_plugins::factory::builtin_registry;

use crate::error::CliError;

pub fn run(cfg: &AppConfig) -> Result<i32, CliError> {
    let registry = builtin_registry(cfg)?;
    let mut out = std::io::stdout().lock();

    let mut write = || -> std::io::Result<()> {
        writeln!(out, "Task kinds:")?;
        for definition in registry.definitions() {
            writeln!(out, "  {:<8} {}", definition.kind(), definition.pattern().as_str())?;
        }
        if !cfg.shell.is_empty() || !cfg.groups.is_empty() {
            writeln!(out, "Configured tasks:")?;
        }
        for (name, task) in &cfg.shell {
            writeln!(out, "  shell/{name}  {}", task.command)?;
        }
        for (name, members) in &cfg.groups {
            writeln!(out, "  group/{name}  [{}]", members.join(", "))?;
        }
        Ok(())
    };
    write().context("writing task list")?;
    Ok(0)
}
