use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use ostbuild_core::config::ShellTaskConfig;
use ostbuild_core::error::{ResolutionError, TaskExecutionError};
use ostbuild_core::task::{
    Isolation, SubprocessPolicy, TaskContext, TaskDefinition, TaskInputs, TaskPattern,
};
use serde_json::{json, Value};
use tokio::process::Command;

use super::captured_name;

pub const INPUT_ENV_PREFIX: &str = "OSTBUILD_INPUT_";

/// `shell/<name>`: runs the configured command with `sh -c` in the task's
/// version directory.
pub struct ShellTask {
    pattern: TaskPattern,
    tasks: BTreeMap<String, ShellTaskConfig>,
}

impl ShellTask {
    pub fn new(tasks: BTreeMap<String, ShellTaskConfig>) -> Result<Self, ResolutionError> {
        Ok(Self {
            pattern: TaskPattern::new(r"shell/(?P<name>[A-Za-z0-9_.+-]+)")?,
            tasks,
        })
    }

    fn lookup(&self, inputs: &TaskInputs) -> Result<&ShellTaskConfig, ResolutionError> {
        let name = captured_name(inputs);
        self.tasks
            .get(name)
            .ok_or_else(|| ResolutionError::NotFound(format!("shell/{name}")))
    }
}

#[async_trait]
impl TaskDefinition for ShellTask {
    fn kind(&self) -> &str {
        "shell"
    }

    fn pattern(&self) -> &TaskPattern {
        &self.pattern
    }

    fn dependencies(&self, inputs: &TaskInputs) -> Result<Vec<String>, ResolutionError> {
        Ok(self.lookup(inputs)?.depends.clone())
    }

    fn isolation(&self, inputs: &TaskInputs) -> Isolation {
        let mut policy = SubprocessPolicy::default();
        if let Ok(cfg) = self.lookup(inputs) {
            policy.retain_success = cfg.retain_success.unwrap_or(policy.retain_success);
            policy.retain_failed = cfg.retain_failed.unwrap_or(policy.retain_failed);
            policy.preserve_output = cfg.preserve_output.unwrap_or(policy.preserve_output);
        }
        Isolation::Subprocess(policy)
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Value, TaskExecutionError> {
        let cfg = self
            .lookup(&ctx.inputs)
            .map_err(|e| TaskExecutionError::Failed(e.to_string()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&cfg.command)
            .current_dir(&ctx.workdir)
            .stdin(Stdio::null());
        for (key, value) in &ctx.inputs {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cmd.env(input_env_name(key), value);
        }

        tracing::info!(task = %ctx.name, command = %cfg.command, "running shell command");
        let started = Instant::now();
        let status = cmd.status().await.map_err(|source| TaskExecutionError::Spawn {
            program: "sh".to_string(),
            source,
        })?;
        let duration_ms = started.elapsed().as_millis() as u64;

        match status.code() {
            Some(0) => Ok(json!({
                "command": cfg.command,
                "exit_code": 0,
                "duration_ms": duration_ms,
            })),
            Some(code) => Err(TaskExecutionError::Failed(format!(
                "command `{}` exited with code {code}",
                cfg.command
            ))),
            None => Err(TaskExecutionError::Failed(format!(
                "command `{}` was terminated by a signal",
                cfg.command
            ))),
        }
    }
}

/// `OSTBUILD_INPUT_<KEY>` with the key upper-cased and non-alphanumerics replaced by `_`.
pub fn input_env_name(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{INPUT_ENV_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostbuild_core::scheduler::CancelToken;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn shell_cfg(command: &str, depends: &[&str]) -> ShellTaskConfig {
        ShellTaskConfig {
            command: command.to_string(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            retain_success: None,
            retain_failed: Some(3),
            preserve_output: None,
        }
    }

    fn task(entries: &[(&str, ShellTaskConfig)]) -> ShellTask {
        ShellTask::new(
            entries
                .iter()
                .map(|(name, cfg)| (name.to_string(), cfg.clone()))
                .collect(),
        )
        .unwrap()
    }

    fn context(dir: &std::path::Path, name: &str, inputs: TaskInputs) -> TaskContext {
        TaskContext {
            name: format!("shell/{name}"),
            inputs,
            workdir: dir.to_path_buf(),
            root: dir.to_path_buf(),
            dependency_results: HashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn env_names_are_sanitized() {
        assert_eq!(input_env_name("arch"), "OSTBUILD_INPUT_ARCH");
        assert_eq!(input_env_name("os-tree.ref"), "OSTBUILD_INPUT_OS_TREE_REF");
    }

    #[test]
    fn dependencies_and_policy_come_from_config() {
        let t = task(&[("compose", shell_cfg("true", &["shell/fetch"]))]);
        let inputs = t.pattern().captures("shell/compose").unwrap();
        assert_eq!(t.dependencies(&inputs).unwrap(), vec!["shell/fetch"]);
        assert_eq!(
            t.isolation(&inputs),
            Isolation::Subprocess(SubprocessPolicy {
                retain_success: 5,
                retain_failed: 3,
                preserve_output: true,
            })
        );
    }

    #[test]
    fn unknown_name_is_not_found() {
        let t = task(&[]);
        let inputs = t.pattern().captures("shell/missing").unwrap();
        assert_eq!(
            t.dependencies(&inputs).unwrap_err(),
            ResolutionError::NotFound("shell/missing".to_string())
        );
    }

    #[tokio::test]
    async fn runs_command_with_inputs_in_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(&[("hello", shell_cfg("echo \"$OSTBUILD_INPUT_WHO\" > greeting", &[]))]);
        let mut inputs = t.pattern().captures("shell/hello").unwrap();
        inputs.insert("who".to_string(), json!("world"));

        let result = t.execute(&context(tmp.path(), "hello", inputs)).await.unwrap();
        assert_eq!(result["exit_code"], json!(0));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("greeting")).unwrap(),
            "world\n"
        );
    }

    #[tokio::test]
    async fn non_zero_exit_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let t = task(&[("broken", shell_cfg("exit 3", &[]))]);
        let inputs = t.pattern().captures("shell/broken").unwrap();

        let err = t.execute(&context(tmp.path(), "broken", inputs)).await.unwrap_err();
        assert!(err.to_string().contains("exited with code 3"), "{err}");
    }

    #[tokio::test]
    async fn backgrounded_command_does_not_hold_the_result_pipe() {
        use std::io::Read;
        use std::os::fd::IntoRawFd;
        use std::time::{Duration, Instant};

        use ostbuild_core::task::TaskRegistry;

        let tmp = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::new();
        registry.register(task(&[("bg", shell_cfg("sleep 5 >/dev/null 2>&1 &", &[]))]));

        let (mut reader, writer) = std::io::pipe().unwrap();
        let fd = writer.into_raw_fd();
        // Inheritable, as the parent hands it to `run-task`.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
        }

        let started = Instant::now();
        ostbuild_core::driver::run_task(&registry, "shell/bg", fd, tmp.path().to_path_buf())
            .await
            .unwrap();

        let read = tokio::task::spawn_blocking(move || {
            let mut buf = String::new();
            reader.read_to_string(&mut buf).map(|_| buf)
        });
        let doc = tokio::time::timeout(Duration::from_secs(3), read)
            .await
            .expect("result pipe stayed open after the task finished")
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        let doc: Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(doc["result"]["exit_code"], json!(0));
    }
}
