use std::sync::Arc;

use ostbuild_core::config::AppConfig;
use ostbuild_core::task::TaskInputs;
use ostbuild_core::{ExecutionEnv, Scheduler};
use ostbuild_plugins::factory::builtin_registry;
use serde_json::Value;
use tracing::Instrument;

use super::cli::MakeArgs;
use crate::error::CliError;

/// What `make` was asked to build.
#[derive(Debug, PartialEq)]
pub enum Targets {
    Names(Vec<String>),
    WithInputs { name: String, inputs: TaskInputs },
}

/// Either plain task names, or one name followed by `key=value` inputs.
/// Values are JSON literals; anything that does not parse is a string.
pub fn parse_targets(targets: &[String]) -> Result<Targets, CliError> {
    let Some((first, rest)) = targets.split_first() else {
        return Err(CliError::Usage("no task names given".into()));
    };
    if first.contains('=') {
        return Err(CliError::Usage(format!("expected a task name, got {first}")));
    }
    if !rest.iter().any(|arg| arg.contains('=')) {
        return Ok(Targets::Names(targets.to_vec()));
    }

    let mut inputs = TaskInputs::new();
    for arg in rest {
        let Some((key, raw)) = arg.split_once('=') else {
            return Err(CliError::Usage(format!(
                "cannot mix task names and key=value inputs: {arg}"
            )));
        };
        if key.is_empty() {
            return Err(CliError::Usage(format!("empty input name in {arg}")));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(Targets::WithInputs {
        name: first.clone(),
        inputs,
    })
}

pub async fn run(args: MakeArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let targets = parse_targets(&args.targets)?;
    let registry = Arc::new(builtin_registry(cfg)?);
    let env = Arc::new(ExecutionEnv::from_config(cfg)?);
    let mut scheduler = Scheduler::new(registry, env).with_config(&cfg.scheduler);

    match targets {
        Targets::Names(names) => scheduler.push(&names)?,
        Targets::WithInputs { name, inputs } => scheduler.push_with_inputs(&name, inputs)?,
    };

    let cancel = scheduler.cancel_token().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; no new tasks will start");
            cancel.cancel();
        }
    });

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("make", %run_id);
    let outcome = scheduler
        .run_with(|success, error| {
            if let (false, Some(error)) = (success, error) {
                tracing::error!(%error, "build failed; waiting for running tasks");
            }
        })
        .instrument(span)
        .await;
    interrupt.abort();

    outcome?;
    println!("Success!");
    Ok(0)
}
