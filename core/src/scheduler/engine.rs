use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::cancel::CancelToken;
use super::graph::{format_cycle_path, topological_order};
use super::progress::ProgressMonitor;
use super::types::{CompletedTask, Completion, TaskInstance};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, TaskExecutionError};
use crate::task::{TaskInputs, TaskRegistry};
use crate::unit::{ExecutionEnv, ExecutionUnit};

pub const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Drives a dependency graph of tasks to completion under a concurrency cap.
///
/// State is owned by the `run` future; units run as spawned tokio tasks and
/// report back over a channel. After the first failure nothing new is
/// dispatched, but units already running are waited for.
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    env: Arc<ExecutionEnv>,
    max_concurrent: usize,
    status_interval: Duration,
    progress: bool,
    cancel: CancelToken,

    pending: Vec<TaskInstance>,
    executing: BTreeSet<String>,
    completed: BTreeMap<String, CompletedTask>,
    failed: BTreeMap<String, String>,
    first_error: Option<SchedulerError>,
}

impl Scheduler {
    pub fn new(registry: Arc<TaskRegistry>, env: Arc<ExecutionEnv>) -> Self {
        Self {
            registry,
            env,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            status_interval: DEFAULT_STATUS_INTERVAL,
            progress: false,
            cancel: CancelToken::new(),
            pending: Vec::new(),
            executing: BTreeSet::new(),
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
            first_error: None,
        }
    }

    pub fn with_config(self, cfg: &SchedulerConfig) -> Self {
        self.with_max_concurrent(cfg.max_concurrent)
            .with_progress(cfg.progress)
            .with_status_interval(Duration::from_millis(cfg.status_interval_ms))
    }

    /// Values below one are raised to one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.status_interval = interval;
        }
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Resolve `names` and their transitive dependencies into the pending list.
    ///
    /// Returns the number of new instances. On error the pending list is unchanged.
    pub fn push<I, S>(&mut self, names: I) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut staged = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            self.expand(name.as_ref(), TaskInputs::new(), &mut staged, &mut seen, &mut Vec::new())?;
        }
        Ok(self.commit(staged))
    }

    /// Push a single root task with caller-supplied inputs layered over its captures.
    pub fn push_with_inputs(
        &mut self,
        name: &str,
        extra_inputs: TaskInputs,
    ) -> Result<usize, SchedulerError> {
        let mut staged = Vec::new();
        self.expand(name, extra_inputs, &mut staged, &mut HashSet::new(), &mut Vec::new())?;
        Ok(self.commit(staged))
    }

    fn commit(&mut self, staged: Vec<TaskInstance>) -> usize {
        let added = staged.len();
        for instance in &staged {
            tracing::debug!(
                task = %instance.name,
                kind = instance.definition.kind(),
                waiting = ?instance.waiting,
                "queued task"
            );
        }
        self.pending.extend(staged);
        added
    }

    fn is_known(&self, name: &str) -> bool {
        self.completed.contains_key(name)
            || self.executing.contains(name)
            || self.pending.iter().any(|t| t.name == name)
    }

    fn expand(
        &self,
        name: &str,
        extra_inputs: TaskInputs,
        staged: &mut Vec<TaskInstance>,
        seen: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Result<(), SchedulerError> {
        if path.iter().any(|p| p == name) {
            return Err(SchedulerError::CircularDependency(format_cycle_path(path, name)));
        }
        if seen.contains(name) || self.is_known(name) {
            return Ok(());
        }
        seen.insert(name.to_string());

        let resolved = self.registry.resolve(name)?;
        let mut inputs = resolved.inputs;
        inputs.extend(extra_inputs.clone());
        let dependencies = resolved.definition.dependencies(&inputs)?;

        path.push(name.to_string());
        for dep in &dependencies {
            self.expand(dep, TaskInputs::new(), staged, seen, path)?;
        }
        path.pop();

        let waiting = dependencies
            .iter()
            .filter(|dep| !self.completed.contains_key(dep.as_str()))
            .cloned()
            .collect();

        staged.push(TaskInstance {
            name: name.to_string(),
            inputs,
            extra_inputs,
            definition: resolved.definition,
            dependencies,
            waiting,
        });
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        self.run_with(|_, _| {}).await
    }

    /// Run until the graph drains. `on_finished` fires exactly once: on the
    /// first failure, or when the run ends otherwise.
    pub async fn run_with<F>(&mut self, on_finished: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(bool, Option<&SchedulerError>),
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let mut on_finished = Some(on_finished);
        let mut progress = ProgressMonitor::new(self.pending.len(), self.progress);
        let mut status = tokio::time::interval(self.status_interval);
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel = self.cancel.clone();

        tracing::info!(
            pending = self.pending.len(),
            max_concurrent = self.max_concurrent,
            "starting run"
        );

        loop {
            self.recalculate(&tx, &mut progress);
            if self.executing.is_empty() {
                break;
            }

            tokio::select! {
                Some(completion) = rx.recv() => {
                    self.handle_completion(completion, &mut progress, &mut on_finished);
                    while let Ok(more) = rx.try_recv() {
                        self.handle_completion(more, &mut progress, &mut on_finished);
                    }
                }
                _ = status.tick() => {
                    let executing: Vec<&str> = self.executing.iter().map(String::as_str).collect();
                    progress.refresh(&executing);
                }
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {
                    tracing::warn!(executing = self.executing.len(), "cancelled; waiting for running tasks");
                }
            }
        }

        let outcome = if let Some(err) = self.first_error.take() {
            Err(err)
        } else if self.pending.is_empty() {
            Ok(())
        } else if cancel.is_cancelled() {
            Err(SchedulerError::Cancelled)
        } else {
            Err(SchedulerError::Stalled(
                self.pending.iter().map(|t| t.name.clone()).collect(),
            ))
        };

        progress.finish(outcome.is_ok());
        if let Some(callback) = on_finished.take() {
            callback(outcome.is_ok(), outcome.as_ref().err());
        }
        match &outcome {
            Ok(()) => tracing::info!(completed = self.completed.len(), "run finished"),
            Err(e) => tracing::error!(error = %e, "run failed"),
        }
        outcome
    }

    /// Reorder pending and dispatch ready tasks up to the limit. Idempotent.
    fn recalculate(&mut self, tx: &mpsc::UnboundedSender<Completion>, progress: &mut ProgressMonitor) {
        if self.pending.is_empty() {
            return;
        }
        self.pending = topological_order(std::mem::take(&mut self.pending));

        if self.first_error.is_some() || self.cancel.is_cancelled() {
            return;
        }

        while self.executing.len() < self.max_concurrent {
            match self.pending.first() {
                Some(head) if head.is_ready() => {}
                _ => break,
            }
            let instance = self.pending.remove(0);
            progress.add_task(&instance.name);
            self.dispatch(instance, tx.clone());
        }
    }

    fn dispatch(&mut self, instance: TaskInstance, tx: mpsc::UnboundedSender<Completion>) {
        let dependency_results: HashMap<String, Value> = instance
            .dependencies
            .iter()
            .filter_map(|dep| {
                self.completed
                    .get(dep)
                    .map(|done| (dep.clone(), done.result.clone()))
            })
            .collect();

        let name = instance.name;
        let unit = ExecutionUnit::for_task(
            &name,
            instance.definition,
            instance.inputs,
            instance.extra_inputs,
            dependency_results,
            Arc::clone(&self.env),
            self.cancel.clone(),
        );

        tracing::info!(task = %name, running = self.executing.len() + 1, "executing task");
        self.executing.insert(name.clone());

        let started = Instant::now();
        let handle = tokio::spawn(unit.run());
        tokio::spawn(async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(TaskExecutionError::Panicked(e.to_string())),
            };
            if let Err(e) = tx.send(Completion {
                name,
                result,
                duration: started.elapsed(),
            }) {
                tracing::debug!(task = %e.0.name, "scheduler loop gone; dropping completion");
            }
        });
    }

    fn handle_completion<F>(
        &mut self,
        completion: Completion,
        progress: &mut ProgressMonitor,
        on_finished: &mut Option<F>,
    ) where
        F: FnOnce(bool, Option<&SchedulerError>),
    {
        let Completion {
            name,
            result,
            duration,
        } = completion;
        self.executing.remove(&name);
        let duration_ms = duration.as_millis() as u64;

        match result {
            Ok(value) => {
                tracing::info!(task = %name, duration_ms, "task complete");
                progress.complete_task(&name, true, duration_ms);
                for task in &mut self.pending {
                    task.waiting.remove(&name);
                }
                self.completed.insert(
                    name.clone(),
                    CompletedTask {
                        name,
                        result: value,
                        duration,
                    },
                );
            }
            Err(error) => {
                tracing::error!(task = %name, duration_ms, error = %error, "task failed");
                progress.complete_task(&name, false, duration_ms);
                self.failed.insert(name.clone(), error.to_string());
                if self.first_error.is_none() {
                    self.first_error = Some(SchedulerError::TaskFailed {
                        task: name,
                        source: error,
                    });
                    if let Some(callback) = on_finished.take() {
                        callback(false, self.first_error.as_ref());
                    }
                }
            }
        }
    }

    pub fn completed(&self, name: &str) -> Option<&CompletedTask> {
        self.completed.get(name)
    }

    pub fn completed_tasks(&self) -> &BTreeMap<String, CompletedTask> {
        &self.completed
    }

    /// Every failure seen, with its message.
    pub fn failed_tasks(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    pub fn pending_names(&self) -> Vec<&str> {
        self.pending.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn executing_count(&self) -> usize {
        self.executing.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
