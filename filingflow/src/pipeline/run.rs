//! Aggregate record of one end-to-end pipeline execution.

use super::TaskGraph;
use crate::context::RunIdentity;
use crate::core::{RunStatus, StepOutput, StepResult, StepStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Why a run ended `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// A step exhausted its retries or failed fatally.
    StepFailed {
        /// The failing step name.
        step: String,
    },
    /// The run was cancelled before the graph was exhausted.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

/// One execution of a task graph: per-step results plus derived status.
///
/// Created with every step pending, mutated only by the executor, and
/// immutable once terminal. External callers observe it through
/// [`RunHandle::snapshot`].
#[derive(Debug)]
pub struct PipelineRun {
    identity: RunIdentity,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    status: RunStatus,
    failure: Option<RunFailure>,
    results: BTreeMap<String, StepResult>,
}

impl PipelineRun {
    /// Creates a run for a graph, with every step pending.
    #[must_use]
    pub fn new(identity: RunIdentity, graph: &TaskGraph) -> Self {
        let results = graph
            .step_names()
            .map(|name| (name.to_string(), StepResult::pending(name)))
            .collect();

        Self {
            identity,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            failure: None,
            results,
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the overall run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the failure reason, if the run failed.
    #[must_use]
    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Returns the per-step results map.
    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, StepResult> {
        &self.results
    }

    /// Returns one step's result.
    #[must_use]
    pub fn result(&self, step: &str) -> Option<&StepResult> {
        self.results.get(step)
    }

    /// Collects the outputs of a step's succeeded dependencies.
    #[must_use]
    pub fn dependency_outputs(
        &self,
        dependencies: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> BTreeMap<String, StepOutput> {
        dependencies
            .into_iter()
            .filter_map(|dep| {
                let name = dep.as_ref();
                self.results
                    .get(name)
                    .and_then(|r| r.output.clone())
                    .map(|output| (name.to_string(), output))
            })
            .collect()
    }

    /// Transitions a step `pending -> running`.
    pub fn start_step(&mut self, step: &str) -> bool {
        self.results.get_mut(step).is_some_and(StepResult::start)
    }

    /// Transitions a step `running -> succeeded`.
    pub fn succeed_step(&mut self, step: &str, output: StepOutput, attempts: u32) -> bool {
        self.results
            .get_mut(step)
            .is_some_and(|r| r.succeed(output, attempts))
    }

    /// Transitions a step `running -> failed`.
    pub fn fail_step(&mut self, step: &str, error: impl Into<String>, attempts: u32) -> bool {
        self.results
            .get_mut(step)
            .is_some_and(|r| r.fail(error, attempts))
    }

    /// Transitions a step `pending -> skipped`, naming the root cause.
    pub fn skip_step(&mut self, step: &str, root_cause: &str) -> bool {
        self.results
            .get_mut(step)
            .is_some_and(|r| r.skip(root_cause))
    }

    /// Derives the overall status from the step statuses.
    #[must_use]
    pub fn derived_status(&self) -> RunStatus {
        if self
            .results
            .values()
            .any(|r| r.status == StepStatus::Failed)
        {
            return RunStatus::Failed;
        }
        if self.results.values().all(StepResult::is_success) {
            return RunStatus::Succeeded;
        }
        RunStatus::Running
    }

    /// Finalizes a run whose graph was exhausted.
    pub fn finalize(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = self.derived_status();
        if self.status == RunStatus::Failed {
            let failing = self
                .results
                .values()
                .find(|r| r.status == StepStatus::Failed)
                .map(|r| r.name.clone())
                .unwrap_or_default();
            self.failure = Some(RunFailure::StepFailed { step: failing });
        }
        self.ended_at = Some(Utc::now());
    }

    /// Finalizes a cancelled run as failed with the cancellation
    /// reason.
    pub fn finalize_cancelled(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.failure = Some(RunFailure::Cancelled {
            reason: reason.into(),
        });
        self.ended_at = Some(Utc::now());
    }

    /// Produces a point-in-time snapshot for external polling.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.identity.run_id,
            pipeline: self.identity.pipeline.clone(),
            status: self.status,
            failure: self.failure.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            steps: self.results.values().map(StepSnapshot::from).collect(),
        }
    }
}

/// Point-in-time view of one step, as reported to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Step name.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Attempts made so far.
    pub attempts: u32,
    /// Last error message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Root-cause step if this one was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_because: Option<String>,
}

impl From<&StepResult> for StepSnapshot {
    fn from(result: &StepResult) -> Self {
        Self {
            name: result.name.clone(),
            status: result.status,
            attempts: result.attempts,
            last_error: result.last_error.clone(),
            skipped_because: result.skipped_because.clone(),
        }
    }
}

/// Point-in-time view of a whole run, as reported to the CLI/scheduler
/// front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// The run ID.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Overall status.
    pub status: RunStatus,
    /// Failure reason, when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended, if terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Per-step snapshots, ordered by step name.
    pub steps: Vec<StepSnapshot>,
}

impl RunSnapshot {
    /// Returns one step's snapshot.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Shared, read-mostly handle to a run in progress.
///
/// Snapshot reads take a short read lock and clone; they never hold the
/// lock across an await, so a concurrently running step's transition is
/// never blocked behind a poller.
#[derive(Debug, Clone)]
pub struct RunHandle {
    inner: Arc<RwLock<PipelineRun>>,
}

impl RunHandle {
    /// Wraps a run in a shared handle.
    #[must_use]
    pub fn new(run: PipelineRun) -> Self {
        Self {
            inner: Arc::new(RwLock::new(run)),
        }
    }

    /// Returns a point-in-time snapshot of the run.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.read().snapshot()
    }

    /// Returns the overall run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.inner.read().status()
    }

    /// Returns true once the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub(crate) fn with_run<T>(&self, f: impl FnOnce(&PipelineRun) -> T) -> T {
        f(&self.inner.read())
    }

    pub(crate) fn with_run_mut<T>(&self, f: impl FnOnce(&mut PipelineRun) -> T) -> T {
        f(&mut self.inner.write())
    }
}
