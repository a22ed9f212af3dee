mod group;
mod shell;

pub use group::GroupTask;
pub use shell::{input_env_name, ShellTask, INPUT_ENV_PREFIX};

use ostbuild_core::task::TaskInputs;

/// The `name` capture every built-in pattern defines.
fn captured_name(inputs: &TaskInputs) -> &str {
    inputs.get("name").and_then(|v| v.as_str()).unwrap_or_default()
}
