//! The canonical filings ingestion pipeline.
//!
//! Assembles the periodic filing workflow (extract a zipped CSV
//! batch, transform it into semi-structured records, provision the
//! warehouse schema and table, load the records, then build and test
//! the downstream models) as one converged task graph. Every step is
//! a first-class action delegating to a collaborator trait, so work
//! done by an external process (archive extraction, model builds) gets
//! the same retry and idempotency treatment as in-process transforms.

mod pipeline;
mod steps;

pub use pipeline::{FilingsConfig, FilingsPipeline};
pub use steps::{
    BuildModelsStep, CreateSchemaStep, CreateTableStep, LoadStep, ReportContextStep,
    TestModelsStep, TransformStep, UnzipStep,
};

use crate::errors::StepError;
use crate::storage::{FilingRecord, StorageTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies one quarterly filing batch, e.g. `2021q4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Creates a batch identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A batch after archive extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedBatch {
    /// The batch the files belong to.
    pub batch: BatchId,
    /// Paths of the extracted CSV files.
    pub files: Vec<String>,
}

/// Extracts a zipped filing batch into readable files.
#[async_trait]
pub trait BatchArchive: Send + Sync {
    /// Extracts the archive for a batch.
    async fn extract(&self, batch: &BatchId) -> Result<ExtractedBatch, StepError>;
}

/// Transforms extracted CSV files into semi-structured filing records.
#[async_trait]
pub trait RecordTransformer: Send + Sync {
    /// Transforms one extracted batch.
    async fn transform(&self, extracted: &ExtractedBatch) -> Result<Vec<FilingRecord>, StepError>;
}

/// Provisions warehouse schemas and tables.
///
/// Implementations follow create-if-not-exists semantics, so the
/// provisioning steps are naturally idempotent.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    /// Ensures the schema exists in the given database.
    async fn ensure_schema(&self, database: &str, schema: &str) -> Result<(), StepError>;

    /// Ensures the target's table exists in the given database.
    async fn ensure_table(&self, database: &str, target: &StorageTarget) -> Result<(), StepError>;
}

/// Outcome of a model build or test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRunReport {
    /// How many models (or tests) were executed.
    pub executed: usize,
}

/// Builds and tests the derived warehouse models.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Builds the models.
    async fn build(&self) -> Result<ModelRunReport, StepError>;

    /// Tests the models.
    async fn test(&self) -> Result<ModelRunReport, StepError>;
}
