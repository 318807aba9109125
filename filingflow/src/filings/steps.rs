//! Step actions of the filings pipeline.

use super::{BatchArchive, BatchId, ExtractedBatch, ModelRunner, RecordTransformer, SchemaManager};
use crate::context::StepContext;
use crate::core::StepOutput;
use crate::errors::StepError;
use crate::steps::StepAction;
use crate::storage::{Loader, Record, StorageTarget};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Upstream step names the actions read outputs from.
pub(super) const UNZIP_BATCH: &str = "unzip_batch";
pub(super) const TRANSFORM_RECORDS: &str = "transform_records";

fn wiring_error(err: impl std::fmt::Display) -> StepError {
    StepError::fatal(err.to_string())
}

fn missing_output(step: &str, key: &str) -> StepError {
    StepError::fatal(format!("upstream '{step}' produced no '{key}' output"))
}

/// Logs the run identity and publishes the batch to downstream steps.
#[derive(Debug, Clone)]
pub struct ReportContextStep {
    batch: BatchId,
}

impl ReportContextStep {
    /// Creates the step.
    #[must_use]
    pub fn new(batch: BatchId) -> Self {
        Self { batch }
    }
}

#[async_trait]
impl StepAction for ReportContextStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let run = ctx.run();
        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline,
            batch = %self.batch,
            scheduled_for = ?run.scheduled_for,
            "processing filing batch"
        );

        let mut output = StepOutput::value("batch", serde_json::json!(self.batch.as_str()))
            .with_value("run_id", serde_json::json!(run.run_id));
        if let Some(scheduled_for) = run.scheduled_for {
            output = output.with_value("scheduled_for", serde_json::json!(scheduled_for));
        }
        Ok(output)
    }
}

/// Extracts the batch archive via the [`BatchArchive`] collaborator.
pub struct UnzipStep {
    archive: Arc<dyn BatchArchive>,
    batch: BatchId,
}

impl UnzipStep {
    /// Creates the step.
    #[must_use]
    pub fn new(archive: Arc<dyn BatchArchive>, batch: BatchId) -> Self {
        Self { archive, batch }
    }
}

impl std::fmt::Debug for UnzipStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnzipStep").field("batch", &self.batch).finish()
    }
}

#[async_trait]
impl StepAction for UnzipStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        let extracted = self.archive.extract(&self.batch).await?;
        info!(batch = %extracted.batch, files = extracted.files.len(), "batch extracted");

        Ok(
            StepOutput::value("batch", serde_json::json!(extracted.batch.as_str()))
                .with_value("files", serde_json::json!(extracted.files))
                .with_value("file_count", serde_json::json!(extracted.files.len())),
        )
    }
}

/// Transforms the extracted files into filing records.
pub struct TransformStep {
    transformer: Arc<dyn RecordTransformer>,
    version: String,
}

impl TransformStep {
    /// Creates the step with a transform version identifier.
    #[must_use]
    pub fn new(transformer: Arc<dyn RecordTransformer>, version: impl Into<String>) -> Self {
        Self {
            transformer,
            version: version.into(),
        }
    }
}

impl std::fmt::Debug for TransformStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformStep")
            .field("version", &self.version)
            .finish()
    }
}

#[async_trait]
impl StepAction for TransformStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let batch = ctx
            .inputs()
            .get_value(UNZIP_BATCH, "batch")
            .map_err(wiring_error)?
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| missing_output(UNZIP_BATCH, "batch"))?
            .to_string();
        let files: Vec<String> = ctx
            .inputs()
            .get_value(UNZIP_BATCH, "files")
            .map_err(wiring_error)?
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StepError::fatal(format!("malformed file list: {e}")))?
            .ok_or_else(|| missing_output(UNZIP_BATCH, "files"))?;

        let extracted = ExtractedBatch {
            batch: BatchId::new(batch),
            files,
        };
        let records = self.transformer.transform(&extracted).await?;
        info!(batch = %extracted.batch, records = records.len(), "batch transformed");

        let rows: Vec<Record> = records
            .iter()
            .map(crate::storage::FilingRecord::to_record)
            .collect::<Result<_, _>>()?;
        Ok(
            StepOutput::value("batch", serde_json::json!(extracted.batch.as_str()))
                .with_value("records", serde_json::Value::Array(rows))
                .with_value("record_count", serde_json::json!(records.len()))
                .with_value("transform_version", serde_json::json!(self.version)),
        )
    }
}

/// Ensures the warehouse schema exists.
pub struct CreateSchemaStep {
    manager: Arc<dyn SchemaManager>,
    database: String,
    schema: String,
}

impl CreateSchemaStep {
    /// Creates the step.
    #[must_use]
    pub fn new(
        manager: Arc<dyn SchemaManager>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            database: database.into(),
            schema: schema.into(),
        }
    }
}

impl std::fmt::Debug for CreateSchemaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateSchemaStep")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

#[async_trait]
impl StepAction for CreateSchemaStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        self.manager
            .ensure_schema(&self.database, &self.schema)
            .await?;
        Ok(StepOutput::value(
            "schema",
            serde_json::json!(format!("{}.{}", self.database, self.schema)),
        ))
    }
}

/// Ensures the target table exists.
pub struct CreateTableStep {
    manager: Arc<dyn SchemaManager>,
    database: String,
    target: StorageTarget,
}

impl CreateTableStep {
    /// Creates the step.
    #[must_use]
    pub fn new(
        manager: Arc<dyn SchemaManager>,
        database: impl Into<String>,
        target: StorageTarget,
    ) -> Self {
        Self {
            manager,
            database: database.into(),
            target,
        }
    }
}

impl std::fmt::Debug for CreateTableStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateTableStep")
            .field("database", &self.database)
            .field("target", &self.target)
            .finish()
    }
}

#[async_trait]
impl StepAction for CreateTableStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        self.manager.ensure_table(&self.database, &self.target).await?;
        Ok(StepOutput::value(
            "table",
            serde_json::json!(self.target.to_string()),
        ))
    }
}

/// Loads the transformed records into the storage target.
pub struct LoadStep {
    loader: Arc<dyn Loader>,
    target: StorageTarget,
}

impl LoadStep {
    /// Creates the step.
    #[must_use]
    pub fn new(loader: Arc<dyn Loader>, target: StorageTarget) -> Self {
        Self { loader, target }
    }
}

impl std::fmt::Debug for LoadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadStep").field("target", &self.target).finish()
    }
}

#[async_trait]
impl StepAction for LoadStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let records: Vec<Record> = match ctx
            .inputs()
            .get_value(TRANSFORM_RECORDS, "records")
            .map_err(wiring_error)?
        {
            Some(serde_json::Value::Array(rows)) => rows.clone(),
            Some(_) => return Err(StepError::fatal("upstream records are not an array")),
            None => return Err(missing_output(TRANSFORM_RECORDS, "records")),
        };

        self.loader.write(&self.target, &records).await?;
        info!(target = %self.target, rows = records.len(), "records loaded");

        Ok(
            StepOutput::value("table", serde_json::json!(self.target.to_string()))
                .with_value("rows_loaded", serde_json::json!(records.len())),
        )
    }
}

/// Builds the derived warehouse models.
pub struct BuildModelsStep {
    runner: Arc<dyn ModelRunner>,
}

impl BuildModelsStep {
    /// Creates the step.
    #[must_use]
    pub fn new(runner: Arc<dyn ModelRunner>) -> Self {
        Self { runner }
    }
}

impl std::fmt::Debug for BuildModelsStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildModelsStep").finish()
    }
}

#[async_trait]
impl StepAction for BuildModelsStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        let report = self.runner.build().await?;
        Ok(StepOutput::value(
            "models_executed",
            serde_json::json!(report.executed),
        ))
    }
}

/// Tests the derived warehouse models.
pub struct TestModelsStep {
    runner: Arc<dyn ModelRunner>,
}

impl TestModelsStep {
    /// Creates the step.
    #[must_use]
    pub fn new(runner: Arc<dyn ModelRunner>) -> Self {
        Self { runner }
    }
}

impl std::fmt::Debug for TestModelsStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestModelsStep").finish()
    }
}

#[async_trait]
impl StepAction for TestModelsStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        let report = self.runner.test().await?;
        Ok(StepOutput::value(
            "tests_executed",
            serde_json::json!(report.executed),
        ))
    }
}
