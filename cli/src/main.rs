use clap::Parser;
mod commands;
mod error;
use commands::cli;
use error::CliError;
use ostbuild_core::config::{self, LoggingConfig};
use ostbuild_core::error::{DriverError, SchedulerError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = config::load(args.config.as_deref())?;
    args.apply_overrides(&mut cfg)?;
    init_tracing(&cfg.logging).map_err(CliError::Logging)?;

    match args.command {
        cli::Commands::Make(make_args) => commands::make::run(make_args, &cfg).await,
        cli::Commands::RunTask(run_args) => commands::run_task::run(run_args, &cfg).await,
        cli::Commands::Tasks => commands::tasks::run(&cfg),
        cli::Commands::History(history_args) => commands::history::run(history_args, &cfg),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 1: a task failed or the run was cancelled
    // 2: bad arguments, unresolvable task or broken graph
    // 11: config error
    // 20: IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) | CliError::Logging(_) => 11,
        CliError::Scheduler(se) => match se {
            SchedulerError::TaskFailed { .. } | SchedulerError::Cancelled => 1,
            SchedulerError::Resolution(_)
            | SchedulerError::CircularDependency(_)
            | SchedulerError::Stalled(_) => 2,
        },
        CliError::Resolution(_) | CliError::Usage(_) => 2,
        CliError::Driver(de) => match de {
            DriverError::Resolution(_) => 2,
            DriverError::Task(_) => 1,
            DriverError::InvalidInputs { .. } => 2,
            DriverError::WriteResult(_) | DriverError::BadResultFd(_) => 20,
        },
        CliError::Io(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(shellexpand::tilde(d).into_owned()),
            None => std::env::temp_dir().join("ostbuild"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("ostbuild.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
