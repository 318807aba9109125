//! Task graph construction and execution.
//!
//! This module provides:
//! - Step specifications and the task graph DAG
//! - Retry policy with backoff strategies
//! - The idempotency guard for side-effecting steps
//! - Pipeline runs, snapshots and the executor

mod executor;
mod graph;
mod idempotency;
mod retry;
mod run;
mod spec;


pub use executor::{Executor, ExecutorConfig, SpawnedRun};
pub use graph::TaskGraph;
pub use idempotency::{
    fingerprint, fingerprint_json, AppliedRecord, BeginOutcome, IdempotencyGuard, IdempotencyKey,
    IdempotencyToken, InMemoryIdempotencyStore,
};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use run::{PipelineRun, RunFailure, RunHandle, RunSnapshot, StepSnapshot};
pub use spec::StepSpec;
