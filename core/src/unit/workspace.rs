use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::version::VersionRecord;
use crate::error::{ResolutionError, TaskExecutionError};
use crate::task::validate_task_name;

pub const SUCCESSFUL_DIR: &str = "successful";
pub const FAILED_DIR: &str = "failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Successful,
    Failed,
}

impl Outcome {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Successful => SUCCESSFUL_DIR,
            Self::Failed => FAILED_DIR,
        }
    }
}

/// Fresh directory a single run executes in, before it is filed by outcome.
#[derive(Debug, Clone)]
pub struct Scratch {
    pub version: VersionRecord,
    pub path: PathBuf,
}

/// On-disk history of one task: `tasks/<name>/{successful,failed}/<version>/`.
#[derive(Debug, Clone)]
pub struct TaskWorkspace {
    dir: PathBuf,
}

impl TaskWorkspace {
    pub fn new(tasks_dir: impl AsRef<Path>, task: &str) -> Result<Self, ResolutionError> {
        validate_task_name(task)?;
        Ok(Self {
            dir: tasks_dir.as_ref().join(task),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn outcome_dir(&self, outcome: Outcome) -> PathBuf {
        self.dir.join(outcome.dir_name())
    }

    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.outcome_dir(Outcome::Successful))?;
        std::fs::create_dir_all(self.outcome_dir(Outcome::Failed))
    }

    /// All recorded versions of both outcomes, oldest first.
    pub fn versions(&self) -> io::Result<Vec<(VersionRecord, Outcome)>> {
        let mut all = Vec::new();
        for outcome in [Outcome::Successful, Outcome::Failed] {
            for version in load_versions(&self.outcome_dir(outcome))? {
                all.push((version, outcome));
            }
        }
        all.sort_by_key(|(version, _)| *version);
        Ok(all)
    }

    pub fn latest_successful(&self) -> io::Result<Option<PathBuf>> {
        let dir = self.outcome_dir(Outcome::Successful);
        Ok(load_versions(&dir)?
            .last()
            .map(|version| dir.join(version.to_string())))
    }

    pub fn next_version(&self, today: NaiveDate) -> io::Result<VersionRecord> {
        let latest = self.versions()?.last().map(|(version, _)| *version);
        Ok(VersionRecord::next_after(latest.as_ref(), today))
    }

    /// Allocate the next version and create its scratch directory.
    ///
    /// Version-named directories left directly under the task directory by an
    /// interrupted run are removed first.
    pub fn prepare(&self, today: NaiveDate) -> Result<Scratch, TaskExecutionError> {
        self.ensure()
            .map_err(|e| TaskExecutionError::io(format!("creating {}", self.dir.display()), e))?;

        let version = self
            .next_version(today)
            .map_err(|e| TaskExecutionError::io(format!("reading {}", self.dir.display()), e))?;

        for stale in load_versions(&self.dir)
            .map_err(|e| TaskExecutionError::io(format!("reading {}", self.dir.display()), e))?
        {
            let path = self.dir.join(stale.to_string());
            tracing::warn!(path = %path.display(), "removing stale scratch directory");
            remove_tree(&path)?;
        }

        let path = self.dir.join(version.to_string());
        remove_tree(&path)?;
        std::fs::create_dir_all(&path)
            .map_err(|e| TaskExecutionError::io(format!("creating {}", path.display()), e))?;

        Ok(Scratch { version, path })
    }

    /// File a finished scratch directory under its outcome and prune old versions.
    ///
    /// Returns the final location of the version directory.
    pub fn finalize(
        &self,
        scratch: &Scratch,
        outcome: Outcome,
        retain: usize,
    ) -> Result<PathBuf, TaskExecutionError> {
        let outcome_dir = self.outcome_dir(outcome);
        let target = outcome_dir.join(scratch.version.to_string());
        remove_tree(&target)?;
        std::fs::rename(&scratch.path, &target).map_err(|e| {
            TaskExecutionError::io(
                format!(
                    "moving {} to {}",
                    scratch.path.display(),
                    target.display()
                ),
                e,
            )
        })?;
        prune(&outcome_dir, retain)?;
        Ok(target)
    }
}

/// Version-named entries of `dir`, oldest first. A missing directory has none.
pub fn load_versions(dir: &Path) -> io::Result<Vec<VersionRecord>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(version) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<VersionRecord>().ok())
        {
            versions.push(version);
        }
    }
    versions.sort();
    Ok(versions)
}

/// Delete the oldest versions in `dir` until at most `retain` remain.
pub fn prune(dir: &Path, retain: usize) -> Result<Vec<VersionRecord>, TaskExecutionError> {
    let versions = load_versions(dir)
        .map_err(|e| TaskExecutionError::io(format!("reading {}", dir.display()), e))?;
    let excess = versions.len().saturating_sub(retain);
    let removed: Vec<VersionRecord> = versions.into_iter().take(excess).collect();
    for version in &removed {
        let path = dir.join(version.to_string());
        tracing::debug!(path = %path.display(), "pruning old version");
        remove_tree(&path)?;
    }
    Ok(removed)
}

fn remove_tree(path: &Path) -> Result<(), TaskExecutionError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskExecutionError::io(
            format!("removing {}", path.display()),
            e,
        )),
    }
}
