use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use ostbuild_core::config::AppConfig;

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "ostbuild", version, about = "Build orchestrator task runner")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of the default lookup.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Build root; task history is kept under `<workdir>/tasks`.
    #[arg(long, global = true)]
    pub workdir: Option<String>,

    /// Maximum number of tasks running at once.
    #[arg(short = 'j', long, global = true)]
    pub max_concurrent: Option<usize>,

    #[arg(long, global = true)]
    pub no_progress: bool,
}

impl Args {
    /// Command-line flags take precedence over file and environment settings.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) -> Result<(), CliError> {
        if let Some(workdir) = &self.workdir {
            cfg.workdir = workdir.clone();
        }
        match self.max_concurrent {
            Some(0) => return Err(CliError::Usage("--max-concurrent must be at least 1".into())),
            Some(n) => cfg.scheduler.max_concurrent = n,
            None => {}
        }
        if self.no_progress {
            cfg.scheduler.progress = false;
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the named tasks and their dependencies.
    Make(MakeArgs),
    /// Run one task body and write its result to an inherited descriptor.
    #[command(hide = true)]
    RunTask(RunTaskArgs),
    /// List registered task kinds and configured tasks.
    Tasks,
    /// Show the recorded versions of a task.
    History(HistoryArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MakeArgs {
    /// `<name>...` or `<name> key=value...`
    #[arg(required = true)]
    pub targets: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunTaskArgs {
    pub name: String,
    pub fd: i32,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct HistoryArgs {
    pub name: String,
}
