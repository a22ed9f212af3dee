use anyhow::Context;
use ostbuild_core::config::AppConfig;
use ostbuild_core::unit::{Outcome, TaskWorkspace};

use super::cli::HistoryArgs;
use crate::error::CliError;

pub fn run(args: HistoryArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let workspace = TaskWorkspace::new(cfg.tasks_dir()?, &args.name)?;
    let versions = workspace
        .versions()
        .with_context(|| format!("reading history of {}", args.name))?;

    if versions.is_empty() {
        println!("no recorded runs of {}", args.name);
        return Ok(0);
    }
    for (version, outcome) in versions.iter().rev() {
        let marker = match outcome {
            Outcome::Successful => "ok  ",
            Outcome::Failed => "FAIL",
        };
        let path = workspace.outcome_dir(*outcome).join(version.to_string());
        println!("{version}  {marker}  {}", path.display());
    }
    Ok(0)
}
