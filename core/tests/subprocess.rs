mod common;

use std::path::PathBuf;

use chrono::NaiveDate;
use common::{env_with_driver, script_env, version_names};
use ostbuild_core::error::TaskExecutionError;
use ostbuild_core::task::{SubprocessPolicy, TaskInputs};
use ostbuild_core::unit::{Outcome, SubprocessUnit, TaskWorkspace};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
}

fn outcome_dir(tasks_dir: &std::path::Path, task: &str, outcome: Outcome) -> PathBuf {
    TaskWorkspace::new(tasks_dir, task).unwrap().outcome_dir(outcome)
}

#[tokio::test]
async fn success_is_filed_under_successful() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();

    let unit = SubprocessUnit::new("p/ok", TaskInputs::new(), SubprocessPolicy::default(), env);
    assert_eq!(unit.run_on(day()).await.unwrap(), json!({"x": 1}));

    let success = outcome_dir(&tasks_dir, "p/ok", Outcome::Successful);
    assert_eq!(version_names(&success), vec!["20240309.0"]);
    assert_eq!(
        std::fs::read_to_string(success.join("20240309.0/output.txt")).unwrap(),
        "hello from p/ok\n"
    );
    assert!(!tasks_dir.join("p/ok/20240309.0").exists());
}

#[tokio::test]
async fn non_zero_exit_is_filed_under_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();

    let unit = SubprocessUnit::new("p/fail", TaskInputs::new(), SubprocessPolicy::default(), env);
    let err = unit.run_on(day()).await.unwrap_err();
    // Exit and end-of-stream race; either is a valid first error.
    assert!(
        matches!(
            err,
            TaskExecutionError::Exited(_) | TaskExecutionError::ResultStream(_)
        ),
        "{err}"
    );

    let failed = outcome_dir(&tasks_dir, "p/fail", Outcome::Failed);
    assert_eq!(version_names(&failed), vec!["20240309.0"]);
    assert_eq!(
        std::fs::read_to_string(failed.join("20240309.0/output.txt")).unwrap(),
        "broken\n"
    );
    assert!(version_names(&outcome_dir(&tasks_dir, "p/fail", Outcome::Successful)).is_empty());
}

#[tokio::test]
async fn missing_result_key_is_null() {
    let tmp = tempfile::tempdir().unwrap();
    let unit = SubprocessUnit::new(
        "p/empty",
        TaskInputs::new(),
        SubprocessPolicy::default(),
        script_env(tmp.path()),
    );
    assert_eq!(unit.run_on(day()).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn unreadable_result_with_clean_exit_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();

    let unit = SubprocessUnit::new("p/garbage", TaskInputs::new(), SubprocessPolicy::default(), env);
    let err = unit.run_on(day()).await.unwrap_err();
    assert!(matches!(err, TaskExecutionError::ResultStream(_)), "{err}");
    assert_eq!(
        version_names(&outcome_dir(&tasks_dir, "p/garbage", Outcome::Failed)),
        vec!["20240309.0"]
    );
}

#[tokio::test]
async fn retention_prunes_oldest_versions_per_outcome() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();
    let policy = SubprocessPolicy {
        retain_success: 2,
        retain_failed: 1,
        preserve_output: true,
    };

    for _ in 0..3 {
        SubprocessUnit::new("p/ok", TaskInputs::new(), policy, env.clone())
            .run_on(day())
            .await
            .unwrap();
    }
    assert_eq!(
        version_names(&outcome_dir(&tasks_dir, "p/ok", Outcome::Successful)),
        vec!["20240309.1", "20240309.2"]
    );

    let next_day = day().succ_opt().unwrap();
    SubprocessUnit::new("p/ok", TaskInputs::new(), policy, env.clone())
        .run_on(next_day)
        .await
        .unwrap();
    assert_eq!(
        version_names(&outcome_dir(&tasks_dir, "p/ok", Outcome::Successful)),
        vec!["20240309.2", "20240310.0"]
    );
}

#[tokio::test]
async fn failed_runs_share_the_version_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();
    let failed = outcome_dir(&tasks_dir, "p/fail", Outcome::Failed);

    for _ in 0..2 {
        let unit = SubprocessUnit::new("p/fail", TaskInputs::new(), SubprocessPolicy::default(), env.clone());
        assert!(unit.run_on(day()).await.is_err());
    }
    assert_eq!(version_names(&failed), vec!["20240309.1"]);
}

#[tokio::test]
async fn extra_inputs_reach_the_child() {
    let tmp = tempfile::tempdir().unwrap();
    let mut inputs = TaskInputs::new();
    inputs.insert("arch".into(), json!("x86_64"));
    inputs.insert("jobs".into(), json!(8));

    let unit = SubprocessUnit::new(
        "p/inputs",
        inputs,
        SubprocessPolicy::default(),
        script_env(tmp.path()),
    );
    assert_eq!(
        unit.run_on(day()).await.unwrap(),
        json!({"arch": "x86_64", "jobs": 8})
    );
}

#[tokio::test]
async fn child_runs_in_scratch_dir_with_build_root_exported() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let root = env.root.clone();

    let unit = SubprocessUnit::new("p/env", TaskInputs::new(), SubprocessPolicy::default(), env);
    let result = unit.run_on(day()).await.unwrap();

    assert_eq!(result["workdir"], json!(root.display().to_string()));
    let cwd = PathBuf::from(result["cwd"].as_str().unwrap());
    assert_eq!(cwd.file_name().unwrap(), "20240309.0");
}

#[tokio::test]
async fn discarded_output_keeps_stderr_only() {
    let tmp = tempfile::tempdir().unwrap();
    let env = script_env(tmp.path());
    let tasks_dir = env.tasks_dir.clone();
    let policy = SubprocessPolicy {
        preserve_output: false,
        ..SubprocessPolicy::default()
    };

    let unit = SubprocessUnit::new("p/fail", TaskInputs::new(), policy, env);
    assert!(unit.run_on(day()).await.is_err());

    let version = outcome_dir(&tasks_dir, "p/fail", Outcome::Failed).join("20240309.0");
    assert_eq!(std::fs::read_to_string(version.join("errors.txt")).unwrap(), "broken\n");
    assert!(!version.join("output.txt").exists());
}

#[tokio::test]
async fn spawn_failure_is_recorded_as_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let env = env_with_driver(tmp.path(), tmp.path().join("no-such-driver"));
    let tasks_dir = env.tasks_dir.clone();

    let unit = SubprocessUnit::new("p/ok", TaskInputs::new(), SubprocessPolicy::default(), env);
    let err = unit.run_on(day()).await.unwrap_err();
    assert!(matches!(err, TaskExecutionError::Spawn { .. }), "{err}");
    assert_eq!(
        version_names(&outcome_dir(&tasks_dir, "p/ok", Outcome::Failed)),
        vec!["20240309.0"]
    );
}
