//! Child side of a subprocess-isolated task (`ostbuild run-task <name> <fd>`).

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::os::fd::{FromRawFd, RawFd};
use std::path::PathBuf;

use crate::error::{DriverError, TaskExecutionError};
use crate::scheduler::CancelToken;
use crate::task::{TaskContext, TaskInputs, TaskRegistry};
use crate::unit::protocol::encode_result;

/// JSON object of caller-supplied inputs handed to the child.
pub const TASK_INPUTS_ENV: &str = "OSTBUILD_TASK_INPUTS";

/// Resolve `name`, run its body in the current directory and write the
/// result document to `fd`.
///
/// `root` is the build root the parent runs in; the current directory is the
/// version scratch directory prepared by the parent.
pub async fn run_task(
    registry: &TaskRegistry,
    name: &str,
    fd: RawFd,
    root: PathBuf,
) -> Result<(), DriverError> {
    let mut out = result_file(fd)?;

    let resolved = registry.resolve(name)?;
    let mut inputs = resolved.inputs;
    inputs.extend(parse_task_inputs(std::env::var(TASK_INPUTS_ENV).ok().as_deref())?);

    let workdir = std::env::current_dir()
        .map_err(|e| TaskExecutionError::io("reading current directory", e))?;
    let ctx = TaskContext {
        name: name.to_string(),
        inputs,
        workdir,
        root,
        dependency_results: HashMap::new(),
        cancel: CancelToken::new(),
    };

    tracing::debug!(task = %name, kind = resolved.definition.kind(), fd, "running task body");
    let value = resolved.definition.execute(&ctx).await?;

    out.write_all(&encode_result(value))
        .and_then(|()| out.flush())
        .map_err(DriverError::WriteResult)
}

/// Decode the inputs variable. Unset or blank means no extra inputs.
pub fn parse_task_inputs(raw: Option<&str>) -> Result<TaskInputs, DriverError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(TaskInputs::new()),
        Some(text) => serde_json::from_str(text).map_err(|source| DriverError::InvalidInputs {
            var: TASK_INPUTS_ENV,
            source,
        }),
    }
}

fn result_file(fd: RawFd) -> Result<File, DriverError> {
    // Standard streams are never the result pipe.
    if fd <= 2 {
        return Err(DriverError::BadResultFd(fd));
    }
    // SAFETY: F_GETFD/F_SETFD only touch the descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(DriverError::BadResultFd(fd));
    }
    // Processes the task body starts must not inherit the write end, or the
    // parent's read only ends when the last of them exits.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(DriverError::BadResultFd(fd));
    }
    // SAFETY: the descriptor is open and this process owns it from here on.
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn blank_inputs_are_empty() {
        assert!(parse_task_inputs(None).unwrap().is_empty());
        assert!(parse_task_inputs(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn inputs_decode_as_object() {
        let inputs = parse_task_inputs(Some(r#"{"arch":"x86_64","jobs":8}"#)).unwrap();
        assert_eq!(inputs.get("arch"), Some(&json!("x86_64")));
        assert_eq!(inputs.get("jobs"), Some(&json!(8)));
    }

    #[test]
    fn non_object_inputs_are_rejected() {
        let err = parse_task_inputs(Some("[1,2]")).unwrap_err();
        assert!(matches!(err, DriverError::InvalidInputs { .. }));
    }

    #[test]
    fn result_descriptor_is_not_inherited_by_task_processes() {
        use std::os::fd::{AsRawFd, IntoRawFd};

        let (_reader, writer) = std::io::pipe().unwrap();
        let fd = writer.into_raw_fd();
        // Arrive the way a spawned driver sees it: inheritable.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
        }

        let file = result_file(fd).unwrap();
        let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }

    #[test]
    fn closed_descriptor_is_rejected() {
        assert!(matches!(result_file(-1), Err(DriverError::BadResultFd(-1))));
        assert!(matches!(result_file(1), Err(DriverError::BadResultFd(1))));
    }
}
