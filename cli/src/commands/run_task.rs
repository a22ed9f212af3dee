use ostbuild_core::config::AppConfig;
use ostbuild_core::driver;
use ostbuild_plugins::factory::builtin_registry;

use super::cli::RunTaskArgs;
use crate::error::CliError;

pub async fn run(args: RunTaskArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let registry = builtin_registry(cfg)?;
    driver::run_task(&registry, &args.name, args.fd, cfg.workdir_path()?).await?;
    Ok(0)
}
