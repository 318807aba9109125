//! # Filingflow
//!
//! The orchestration core of a financial-filings ingestion system.
//!
//! Filingflow sequences heterogeneous pipeline steps (extract,
//! transform, schema provisioning, load, model build, validation)
//! through an explicit task graph with:
//!
//! - **Dependency-ordered execution**: steps run as soon as every
//!   dependency has succeeded, in parallel up to a configured bound
//! - **Retry with backoff**: transient failures retry per policy;
//!   fatal failures short-circuit and skip dependents
//! - **Idempotent re-execution**: side-effecting steps are guarded so
//!   a crash-and-resume never applies the same work twice
//! - **Cooperative cancellation**: running steps finish naturally,
//!   nothing new is dispatched
//!
//! Warehouse and process I/O stay behind collaborator seams
//! ([`storage::Loader`], [`storage::QueryStore`], the traits in
//! [`filings`]), so the graph, retry and idempotency logic are
//! unit-testable without a live warehouse connection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use filingflow::prelude::*;
//!
//! let mut graph = TaskGraph::new("filings");
//! graph.add_step(StepSpec::new("extract", extract_action))?;
//! graph.add_step(StepSpec::new("load", load_action).with_dependency("extract"))?;
//!
//! let executor = Executor::new(Arc::new(graph));
//! let snapshot = executor.execute(RunIdentity::new("filings")).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod filings;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{RunIdentity, StepContext, StepInputs};
    pub use crate::core::{RunStatus, StepOutput, StepResult, StepStatus};
    pub use crate::errors::{ErrorClass, GraphError, PipelineError, StepError};
    pub use crate::filings::{BatchId, FilingsConfig, FilingsPipeline};
    pub use crate::pipeline::{
        BackoffStrategy, Executor, ExecutorConfig, IdempotencyGuard, InMemoryIdempotencyStore,
        RetryPolicy, RunHandle, RunSnapshot, StepSpec, TaskGraph,
    };
    pub use crate::steps::{BoxedAction, FnStep, NoOpStep, StepAction};
    pub use crate::storage::{FilingRecord, Loader, QueryStore, Record, StorageTarget};
    pub use crate::utils::{Sleeper, TokioSleeper};
}
