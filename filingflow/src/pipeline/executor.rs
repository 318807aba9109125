//! Single-run executor: walks the graph in dependency order, dispatches
//! ready steps onto a bounded worker pool, applies retry and
//! idempotency policy, and records results on the run.
//!
//! The dependency-resolution loop is serialized so step transitions
//! stay linearizable; workers block only inside their own action or
//! backoff sleep, never holding the run lock.

use super::{
    fingerprint, fingerprint_json, AppliedRecord, BeginOutcome, IdempotencyGuard, IdempotencyKey,
    InMemoryIdempotencyStore, PipelineRun, RunHandle, RunSnapshot, StepSpec, TaskGraph,
};
use crate::cancellation::CancellationToken;
use crate::context::{RunIdentity, StepContext, StepInputs};
use crate::core::StepOutput;
use crate::errors::StepError;
use crate::utils::{Sleeper, TokioSleeper};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tunables for one executor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of steps running concurrently.
    pub concurrency: usize,
    /// Configuration injected into every step's context.
    #[serde(default)]
    pub step_config: BTreeMap<String, serde_json::Value>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            step_config: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker-pool bound (clamped to at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Adds a configuration value visible to every step context.
    #[must_use]
    pub fn with_step_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.step_config.insert(key.into(), value);
        self
    }
}

/// Terminal outcome of one step worker.
#[derive(Debug)]
enum StepOutcome {
    /// The action ran and succeeded.
    Succeeded(StepOutput),
    /// A prior application was found; its recorded success is replayed.
    Replayed(AppliedRecord),
    /// The action failed terminally (retries exhausted or fatal).
    Failed(StepError),
}

#[derive(Debug)]
struct StepCompletion {
    attempts: u32,
    outcome: StepOutcome,
}

/// Drives one [`TaskGraph`] to completion per run.
///
/// The executor itself never errors out mid-run: step failures are
/// recorded on the run, dependents are skipped, and independent
/// branches keep executing.
#[derive(Clone)]
pub struct Executor {
    graph: Arc<TaskGraph>,
    guard: Arc<dyn IdempotencyGuard>,
    sleeper: Arc<dyn Sleeper>,
    cancel: Arc<CancellationToken>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pipeline", &self.graph.name())
            .field("steps", &self.graph.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Executor {
    /// Creates an executor with an in-memory idempotency store, the
    /// tokio sleeper and default configuration.
    #[must_use]
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        Self {
            graph,
            guard: Arc::new(InMemoryIdempotencyStore::new()),
            sleeper: Arc::new(TokioSleeper),
            cancel: Arc::new(CancellationToken::new()),
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the idempotency guard.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<dyn IdempotencyGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Sets the sleeper used for retry backoff.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the cancellation token observed by the scheduling loop.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the executor configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the cancellation token for this executor.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Runs the graph to completion and returns the terminal snapshot.
    pub async fn execute(&self, identity: RunIdentity) -> RunSnapshot {
        let handle = RunHandle::new(PipelineRun::new(identity.clone(), &self.graph));
        self.drive(identity, handle.clone()).await;
        handle.snapshot()
    }

    /// Starts a run in the background, returning a pollable handle.
    #[must_use]
    pub fn spawn(&self, identity: RunIdentity) -> SpawnedRun {
        let handle = RunHandle::new(PipelineRun::new(identity.clone(), &self.graph));
        let executor = self.clone();
        let driver_handle = handle.clone();
        let join = tokio::spawn(async move {
            executor.drive(identity, driver_handle).await;
        });
        SpawnedRun { handle, join }
    }

    async fn drive(&self, identity: RunIdentity, handle: RunHandle) {
        info!(
            run_id = %identity.run_id,
            pipeline = %identity.pipeline,
            steps = self.graph.len(),
            "run started"
        );

        let mut active: FuturesUnordered<
            BoxFuture<'static, (String, Result<StepCompletion, tokio::task::JoinError>)>,
        > = FuturesUnordered::new();

        loop {
            if !self.cancel.is_cancelled() {
                self.dispatch_ready(&identity, &handle, &mut active);
            }

            if active.is_empty() {
                let terminal = handle.with_run(|run| self.graph.is_terminal(run.results()));
                if terminal {
                    handle.with_run_mut(PipelineRun::finalize);
                } else if self.cancel.is_cancelled() {
                    let reason = self
                        .cancel
                        .reason()
                        .unwrap_or_else(|| "cancelled".to_string());
                    info!(run_id = %identity.run_id, %reason, "run cancelled");
                    handle.with_run_mut(|run| run.finalize_cancelled(reason));
                } else {
                    // Unreachable with a validated DAG; recorded rather
                    // than looping forever.
                    error!(run_id = %identity.run_id, "no dispatchable steps remain");
                    handle.with_run_mut(|run| {
                        run.finalize_cancelled("internal: no dispatchable steps remain");
                    });
                }
                break;
            }

            if let Some((step, joined)) = active.next().await {
                self.record_completion(&handle, &step, joined);
            }
        }

        let snapshot = handle.snapshot();
        info!(
            run_id = %identity.run_id,
            status = %snapshot.status,
            "run finished"
        );
    }

    /// Dispatches ready steps, lexicographically, up to the pool bound.
    fn dispatch_ready(
        &self,
        identity: &RunIdentity,
        handle: &RunHandle,
        active: &mut FuturesUnordered<
            BoxFuture<'static, (String, Result<StepCompletion, tokio::task::JoinError>)>,
        >,
    ) {
        let ready: Vec<String> = handle.with_run(|run| {
            self.graph
                .ready_steps(run.results())
                .into_iter()
                .map(|spec| spec.name.clone())
                .collect()
        });

        // Clamped here as well as in the builder: a config arriving via
        // a struct literal or deserialization may carry zero, and a
        // zero-width pool would stall the run.
        let concurrency = self.config.concurrency.max(1);
        for name in ready {
            if active.len() >= concurrency {
                break;
            }
            let Some(spec) = self.graph.get(&name) else {
                continue;
            };

            // Transition and snapshot the dependency outputs under one
            // write lock so the step can only be dispatched once.
            let outputs = handle.with_run_mut(|run| {
                run.start_step(&name)
                    .then(|| run.dependency_outputs(&spec.dependencies))
            });
            let Some(outputs) = outputs else {
                continue;
            };

            debug!(step = %name, "step dispatched");
            let ctx = StepContext::new(
                identity.clone(),
                &name,
                StepInputs::new(&name, spec.dependencies.clone(), outputs),
                self.config.step_config.clone(),
            );
            let worker = StepWorker {
                spec: spec.clone(),
                guard: self.guard.clone(),
                sleeper: self.sleeper.clone(),
                cancel: self.cancel.clone(),
                ctx,
            };
            let task = tokio::spawn(worker.run());
            active.push(Box::pin(async move { (name, task.await) }));
        }
    }

    /// Applies one worker's terminal outcome to the run.
    fn record_completion(
        &self,
        handle: &RunHandle,
        step: &str,
        joined: Result<StepCompletion, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(completion) => match completion.outcome {
                StepOutcome::Succeeded(output) => {
                    debug!(step, attempts = completion.attempts, "step succeeded");
                    handle.with_run_mut(|run| {
                        run.succeed_step(step, output, completion.attempts);
                    });
                }
                StepOutcome::Replayed(record) => {
                    info!(step, "already applied; replaying recorded result");
                    handle.with_run_mut(|run| {
                        run.succeed_step(step, record.output, record.attempts);
                    });
                }
                StepOutcome::Failed(err) => {
                    warn!(
                        step,
                        class = %err.class,
                        attempts = completion.attempts,
                        error = %err.message,
                        "step failed terminally"
                    );
                    self.fail_and_skip(handle, step, &err.to_string(), completion.attempts);
                }
            },
            Err(join_err) => {
                error!(step, error = %join_err, "step task aborted");
                self.fail_and_skip(handle, step, &format!("step aborted: {join_err}"), 1);
            }
        }
    }

    fn fail_and_skip(&self, handle: &RunHandle, step: &str, error: &str, attempts: u32) {
        let dependents = self.graph.transitive_dependents(step);
        handle.with_run_mut(|run| {
            run.fail_step(step, error, attempts);
            for dependent in &dependents {
                if run.skip_step(dependent, step) {
                    debug!(step = %dependent, root_cause = step, "step skipped");
                }
            }
        });
    }
}

/// A run started with [`Executor::spawn`]: pollable while in flight.
#[derive(Debug)]
pub struct SpawnedRun {
    handle: RunHandle,
    join: tokio::task::JoinHandle<()>,
}

impl SpawnedRun {
    /// Returns the pollable run handle.
    #[must_use]
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    /// Waits for the run to finish and returns the terminal snapshot.
    pub async fn wait(self) -> RunSnapshot {
        let _ = self.join.await;
        self.handle.snapshot()
    }
}

/// Executes one step to a terminal outcome: runs the action under the
/// idempotency guard and applies the retry policy between attempts.
struct StepWorker {
    spec: StepSpec,
    guard: Arc<dyn IdempotencyGuard>,
    sleeper: Arc<dyn Sleeper>,
    cancel: Arc<CancellationToken>,
    ctx: StepContext,
}

impl StepWorker {
    async fn run(self) -> StepCompletion {
        let key = IdempotencyKey::new(
            &self.spec.name,
            self.ctx.run().run_id,
            self.input_fingerprint(),
        );
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let token = match self.guard.begin(key.clone()).await {
                Ok(BeginOutcome::AlreadyApplied(record)) => {
                    return StepCompletion {
                        attempts: record.attempts,
                        outcome: StepOutcome::Replayed(record),
                    };
                }
                Ok(BeginOutcome::Fresh(token)) => token,
                Err(err) => {
                    if let Some(delay) = self.retry_after(attempts, &err) {
                        self.sleeper.sleep(delay).await;
                        continue;
                    }
                    return StepCompletion {
                        attempts,
                        outcome: StepOutcome::Failed(err),
                    };
                }
            };

            match self.spec.action.run(&self.ctx).await {
                Ok(output) => {
                    let record = AppliedRecord::new(output.clone(), attempts);
                    if let Err(err) = self.guard.commit(token, record).await {
                        // The side effect is applied; losing the marker
                        // only costs replay detection on a later rerun.
                        warn!(step = %self.spec.name, error = %err, "idempotency commit failed");
                    }
                    return StepCompletion {
                        attempts,
                        outcome: StepOutcome::Succeeded(output),
                    };
                }
                Err(err) => {
                    if let Err(abort_err) = self.guard.abort(token).await {
                        warn!(step = %self.spec.name, error = %abort_err, "idempotency abort failed");
                    }
                    debug!(
                        step = %self.spec.name,
                        attempt = attempts,
                        class = %err.class,
                        error = %err.message,
                        "attempt failed"
                    );
                    if let Some(delay) = self.retry_after(attempts, &err) {
                        self.sleeper.sleep(delay).await;
                        continue;
                    }
                    return StepCompletion {
                        attempts,
                        outcome: StepOutcome::Failed(err),
                    };
                }
            }
        }
    }

    /// Returns the backoff delay if the error warrants another attempt.
    ///
    /// After cancellation has been observed the step does not re-enter
    /// backoff; it fails with its last real error.
    fn retry_after(&self, attempts: u32, err: &StepError) -> Option<std::time::Duration> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if !self.spec.retry.should_retry(attempts, err) {
            return None;
        }
        Some(self.spec.retry.delay_before(attempts + 1))
    }

    /// Content fingerprint of the step's logical inputs.
    fn input_fingerprint(&self) -> String {
        if self.spec.fingerprint_inputs.is_empty() {
            let payload = serde_json::json!({
                "step": self.spec.name,
                "inputs": self.ctx.inputs().outputs(),
            });
            fingerprint_json(&payload)
        } else {
            let mut parts: Vec<&str> = vec![self.spec.name.as_str()];
            parts.extend(self.spec.fingerprint_inputs.iter().map(String::as_str));
            fingerprint(&parts)
        }
    }
}
