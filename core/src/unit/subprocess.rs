use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::net::unix::pipe;
use tokio::process::Command;

use super::protocol::read_result;
use super::version::today_utc;
use super::workspace::{Outcome, Scratch, TaskWorkspace};
use super::ExecutionEnv;
use crate::config::{CONFIG_ENV, WORKDIR_ENV};
use crate::driver::TASK_INPUTS_ENV;
use crate::error::TaskExecutionError;
use crate::task::{SubprocessPolicy, TaskInputs};

const OUTPUT_FILE: &str = "output.txt";
const ERRORS_FILE: &str = "errors.txt";

/// Runs one task in a child process inside a fresh version directory.
pub struct SubprocessUnit {
    name: String,
    extra_inputs: TaskInputs,
    policy: SubprocessPolicy,
    env: Arc<ExecutionEnv>,
}

enum Signal {
    Exited(Result<(), TaskExecutionError>),
    ResultRead(Result<Value, TaskExecutionError>),
}

impl SubprocessUnit {
    pub fn new(
        name: &str,
        extra_inputs: TaskInputs,
        policy: SubprocessPolicy,
        env: Arc<ExecutionEnv>,
    ) -> Self {
        Self {
            name: name.to_string(),
            extra_inputs,
            policy,
            env,
        }
    }

    pub async fn run(self) -> Result<Value, TaskExecutionError> {
        self.run_on(today_utc()).await
    }

    /// Run with an explicit date for version allocation.
    pub async fn run_on(self, today: NaiveDate) -> Result<Value, TaskExecutionError> {
        let workspace = TaskWorkspace::new(&self.env.tasks_dir, &self.name)
            .map_err(|e| TaskExecutionError::Failed(e.to_string()))?;

        let scratch = {
            let workspace = workspace.clone();
            tokio::task::spawn_blocking(move || workspace.prepare(today))
                .await
                .map_err(|e| TaskExecutionError::Panicked(e.to_string()))??
        };
        tracing::debug!(
            task = %self.name,
            version = %scratch.version,
            dir = %scratch.path.display(),
            "prepared version directory"
        );

        let started = Instant::now();
        let outcome = self.execute(&scratch).await;
        let success = outcome.is_ok();
        tracing::debug!(
            task = %self.name,
            success,
            duration_ms = started.elapsed().as_millis() as u64,
            "child finished"
        );

        let (filed_as, retain) = if success {
            (Outcome::Successful, self.policy.retain_success)
        } else {
            (Outcome::Failed, self.policy.retain_failed)
        };
        let stored = {
            let scratch = scratch.clone();
            tokio::task::spawn_blocking(move || workspace.finalize(&scratch, filed_as, retain))
                .await
                .map_err(|e| TaskExecutionError::Panicked(e.to_string()))??
        };
        tracing::info!("stored results of {} in {}", self.name, stored.display());

        outcome
    }

    async fn execute(&self, scratch: &Scratch) -> Result<Value, TaskExecutionError> {
        let (reader, writer) = std::io::pipe()
            .map_err(|e| TaskExecutionError::io("creating result pipe", e))?;
        let child_fd = writer.as_raw_fd();

        let mut cmd = Command::new(&self.env.driver.program);
        cmd.arg("run-task")
            .arg(&self.name)
            .arg(child_fd.to_string())
            .current_dir(&scratch.path)
            .stdin(Stdio::piped())
            .env(WORKDIR_ENV, &self.env.root)
            .kill_on_drop(true);

        match &self.env.driver.config {
            Some(path) => cmd.env(CONFIG_ENV, path),
            None => cmd.env_remove(CONFIG_ENV),
        };

        if self.extra_inputs.is_empty() {
            cmd.env_remove(TASK_INPUTS_ENV);
        } else {
            let encoded = serde_json::to_string(&self.extra_inputs)
                .map_err(|e| TaskExecutionError::Failed(format!("encoding inputs: {e}")))?;
            cmd.env(TASK_INPUTS_ENV, encoded);
        }

        self.attach_output(&mut cmd, &scratch.path)?;

        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            cmd.pre_exec(move || {
                let flags = libc::fcntl(child_fd, libc::F_GETFD);
                if flags < 0
                    || libc::fcntl(child_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| TaskExecutionError::Spawn {
            program: self.env.driver.program.display().to_string(),
            source,
        })?;
        // Only the child may hold the write end, or the read never sees EOF.
        drop(writer);
        drop(child.stdin.take());

        let mut receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
            .map_err(|e| TaskExecutionError::io("opening result pipe", e))?;

        let mut signals: FuturesUnordered<BoxFuture<'_, Signal>> = FuturesUnordered::new();
        signals.push(Box::pin(async move {
            let status = child
                .wait()
                .await
                .map_err(|e| TaskExecutionError::io("waiting for child", e));
            Signal::Exited(status.and_then(check_status))
        }));
        signals.push(Box::pin(async move {
            Signal::ResultRead(read_result(&mut receiver).await)
        }));

        let mut outstanding = 2;
        let mut first_error: Option<TaskExecutionError> = None;
        let mut result: Option<Value> = None;
        while let Some(signal) = signals.next().await {
            outstanding -= 1;
            let err = match signal {
                Signal::Exited(Ok(())) => None,
                Signal::Exited(Err(e)) => Some(e),
                Signal::ResultRead(Ok(value)) => {
                    result = Some(value);
                    None
                }
                Signal::ResultRead(Err(e)) => Some(e),
            };
            if let Some(e) = err {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::debug!(task = %self.name, error = %e, "ignoring later failure");
                }
            }
            if outstanding == 0 {
                break;
            }
        }

        match (first_error, result) {
            (Some(e), _) => Err(e),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(TaskExecutionError::ResultStream(
                "no result received".to_string(),
            )),
        }
    }

    fn attach_output(&self, cmd: &mut Command, dir: &std::path::Path) -> Result<(), TaskExecutionError> {
        let create = |name: &str| -> Result<File, TaskExecutionError> {
            let path: PathBuf = dir.join(name);
            File::create(&path)
                .map_err(|e| TaskExecutionError::io(format!("creating {}", path.display()), e))
        };

        if self.policy.preserve_output {
            let output = create(OUTPUT_FILE)?;
            let stderr = output
                .try_clone()
                .map_err(|e| TaskExecutionError::io("duplicating output handle", e))?;
            cmd.stdout(Stdio::from(output)).stderr(Stdio::from(stderr));
        } else {
            cmd.stdout(Stdio::null())
                .stderr(Stdio::from(create(ERRORS_FILE)?));
        }
        Ok(())
    }
}

fn check_status(status: ExitStatus) -> Result<(), TaskExecutionError> {
    if status.success() {
        return Ok(());
    }
    Err(TaskExecutionError::Exited(describe_exit(status)))
}

fn describe_exit(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "exited abnormally".to_string(),
    }
}
