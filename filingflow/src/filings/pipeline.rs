//! Assembly of the filings task graph.

use super::steps::{TRANSFORM_RECORDS, UNZIP_BATCH};
use super::{
    BatchArchive, BatchId, BuildModelsStep, CreateSchemaStep, CreateTableStep, LoadStep,
    ModelRunner, RecordTransformer, ReportContextStep, SchemaManager, TestModelsStep,
    TransformStep, UnzipStep,
};
use crate::errors::GraphError;
use crate::pipeline::{RetryPolicy, StepSpec, TaskGraph};
use crate::storage::{Loader, StorageTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration of one filings pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingsConfig {
    /// The batch to ingest.
    pub batch: BatchId,
    /// Version identifier of the CSV-to-record transform. Bumping it
    /// changes step fingerprints, so a re-run with new transform logic
    /// is treated as new work rather than replayed.
    pub transform_version: String,
    /// The warehouse database.
    pub database: String,
    /// The storage shape this instance loads into.
    pub target: StorageTarget,
    /// Default retry policy for warehouse-facing steps.
    pub retry: RetryPolicy,
}

impl FilingsConfig {
    /// Creates a configuration for a batch with the stock defaults:
    /// one retry after five minutes, loading the JSON/variant shape.
    #[must_use]
    pub fn new(batch: BatchId) -> Self {
        Self {
            batch,
            transform_version: "v1".to_string(),
            database: "DBT_DB".to_string(),
            target: StorageTarget::Json,
            retry: RetryPolicy::fixed(2, Duration::from_secs(300)),
        }
    }

    /// Sets the transform version.
    #[must_use]
    pub fn with_transform_version(mut self, version: impl Into<String>) -> Self {
        self.transform_version = version.into();
        self
    }

    /// Sets the warehouse database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the storage target.
    #[must_use]
    pub fn with_target(mut self, target: StorageTarget) -> Self {
        self.target = target;
        self
    }

    /// Sets the retry policy for warehouse-facing steps.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Wires the filings steps and collaborators into a task graph.
pub struct FilingsPipeline {
    config: FilingsConfig,
    archive: Arc<dyn BatchArchive>,
    transformer: Arc<dyn RecordTransformer>,
    schema_manager: Arc<dyn SchemaManager>,
    loader: Arc<dyn Loader>,
    model_runner: Arc<dyn ModelRunner>,
}

impl std::fmt::Debug for FilingsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilingsPipeline")
            .field("config", &self.config)
            .finish()
    }
}

impl FilingsPipeline {
    /// Creates the pipeline from its collaborators.
    #[must_use]
    pub fn new(
        config: FilingsConfig,
        archive: Arc<dyn BatchArchive>,
        transformer: Arc<dyn RecordTransformer>,
        schema_manager: Arc<dyn SchemaManager>,
        loader: Arc<dyn Loader>,
        model_runner: Arc<dyn ModelRunner>,
    ) -> Self {
        Self {
            config,
            archive,
            transformer,
            schema_manager,
            loader,
            model_runner,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FilingsConfig {
        &self.config
    }

    /// Builds the converged task graph:
    ///
    /// ```text
    /// report_context -> unzip_batch -> transform_records
    ///   -> create_schema -> create_table -> load_records
    ///   -> build_models -> test_models
    /// ```
    ///
    /// `load_records` additionally depends on `transform_records`
    /// directly, since that is where its rows come from.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] if the wiring is invalid; with the
    /// fixed step set this indicates a programming error.
    pub fn task_graph(&self) -> Result<TaskGraph, GraphError> {
        let c = &self.config;
        let mut graph = TaskGraph::new("filings");

        graph.add_step(
            StepSpec::new(
                "report_context",
                Arc::new(ReportContextStep::new(c.batch.clone())),
            )
            .with_retry(RetryPolicy::none())
            .with_fingerprint_input(c.batch.as_str()),
        )?;

        graph.add_step(
            StepSpec::new(
                UNZIP_BATCH,
                Arc::new(UnzipStep::new(self.archive.clone(), c.batch.clone())),
            )
            .with_dependency("report_context")
            .with_retry(c.retry.clone())
            .with_fingerprint_input(c.batch.as_str()),
        )?;

        graph.add_step(
            StepSpec::new(
                TRANSFORM_RECORDS,
                Arc::new(TransformStep::new(
                    self.transformer.clone(),
                    &c.transform_version,
                )),
            )
            .with_dependency(UNZIP_BATCH)
            .with_retry(c.retry.clone())
            .with_fingerprint_input(c.batch.as_str())
            .with_fingerprint_input(&c.transform_version),
        )?;

        graph.add_step(
            StepSpec::new(
                "create_schema",
                Arc::new(CreateSchemaStep::new(
                    self.schema_manager.clone(),
                    &c.database,
                    c.target.schema_name(),
                )),
            )
            .with_dependency(TRANSFORM_RECORDS)
            .with_retry(c.retry.clone())
            .with_fingerprint_input(&c.database)
            .with_fingerprint_input(c.target.schema_name()),
        )?;

        graph.add_step(
            StepSpec::new(
                "create_table",
                Arc::new(CreateTableStep::new(
                    self.schema_manager.clone(),
                    &c.database,
                    c.target,
                )),
            )
            .with_dependency("create_schema")
            .with_retry(c.retry.clone())
            .with_fingerprint_input(&c.database)
            .with_fingerprint_input(c.target.table_name()),
        )?;

        graph.add_step(
            StepSpec::new(
                "load_records",
                Arc::new(LoadStep::new(self.loader.clone(), c.target)),
            )
            .with_dependencies([TRANSFORM_RECORDS, "create_table"])
            .with_retry(c.retry.clone())
            .with_fingerprint_input(c.batch.as_str())
            .with_fingerprint_input(&c.transform_version)
            .with_fingerprint_input(c.target.table_name()),
        )?;

        graph.add_step(
            StepSpec::new(
                "build_models",
                Arc::new(BuildModelsStep::new(self.model_runner.clone())),
            )
            .with_dependency("load_records")
            .with_retry(c.retry.clone())
            .with_fingerprint_input(c.batch.as_str()),
        )?;

        graph.add_step(
            StepSpec::new(
                "test_models",
                Arc::new(TestModelsStep::new(self.model_runner.clone())),
            )
            .with_dependency("build_models")
            .with_retry(c.retry.clone())
            .with_fingerprint_input(c.batch.as_str()),
        )?;

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunIdentity;
    use crate::core::{RunStatus, StepStatus};
    use crate::errors::StepError;
    use crate::filings::{ExtractedBatch, ModelRunReport};
    use crate::pipeline::{Executor, InMemoryIdempotencyStore};
    use crate::storage::{FilingRecord, MemoryWarehouse, QueryStore};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct StaticArchive;

    #[async_trait]
    impl BatchArchive for StaticArchive {
        async fn extract(&self, batch: &BatchId) -> Result<ExtractedBatch, StepError> {
            Ok(ExtractedBatch {
                batch: batch.clone(),
                files: vec!["sub.txt".to_string(), "num.txt".to_string()],
            })
        }
    }

    #[derive(Debug, Default)]
    struct FixtureTransformer;

    #[async_trait]
    impl RecordTransformer for FixtureTransformer {
        async fn transform(
            &self,
            extracted: &ExtractedBatch,
        ) -> Result<Vec<FilingRecord>, StepError> {
            Ok(["Assets", "Liabilities"]
                .iter()
                .enumerate()
                .map(|(i, tag)| FilingRecord {
                    cik: "0000320193".to_string(),
                    company_name: "Apple Inc.".to_string(),
                    filing_date: NaiveDate::from_ymd_opt(2021, 10, 29).unwrap(),
                    fiscal_year: 2021,
                    adsh: format!("0000320193-21-00010{i}"),
                    tag: (*tag).to_string(),
                    value: 1000.0 + i as f64,
                    unit: "USD".to_string(),
                    data: serde_json::json!({"batch": extracted.batch.as_str()}),
                })
                .collect())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingSchemaManager {
        schemas: Mutex<Vec<String>>,
        tables: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SchemaManager for RecordingSchemaManager {
        async fn ensure_schema(&self, database: &str, schema: &str) -> Result<(), StepError> {
            self.schemas.lock().push(format!("{database}.{schema}"));
            Ok(())
        }

        async fn ensure_table(
            &self,
            database: &str,
            target: &StorageTarget,
        ) -> Result<(), StepError> {
            self.tables.lock().push(format!("{database}.{target}"));
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct CountingModelRunner {
        builds: AtomicUsize,
        tests: AtomicUsize,
    }

    #[async_trait]
    impl ModelRunner for CountingModelRunner {
        async fn build(&self) -> Result<ModelRunReport, StepError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(ModelRunReport { executed: 3 })
        }

        async fn test(&self) -> Result<ModelRunReport, StepError> {
            self.tests.fetch_add(1, Ordering::SeqCst);
            Ok(ModelRunReport { executed: 5 })
        }
    }

    struct Fixture {
        pipeline: FilingsPipeline,
        warehouse: Arc<MemoryWarehouse>,
        schema_manager: Arc<RecordingSchemaManager>,
        model_runner: Arc<CountingModelRunner>,
    }

    fn fixture() -> Fixture {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let schema_manager = Arc::new(RecordingSchemaManager::default());
        let model_runner = Arc::new(CountingModelRunner::default());
        let pipeline = FilingsPipeline::new(
            FilingsConfig::new(BatchId::new("2021q4")),
            Arc::new(StaticArchive),
            Arc::new(FixtureTransformer),
            schema_manager.clone(),
            warehouse.clone(),
            model_runner.clone(),
        );
        Fixture {
            pipeline,
            warehouse,
            schema_manager,
            model_runner,
        }
    }

    #[test]
    fn test_graph_wiring() {
        let graph = fixture().pipeline.task_graph().unwrap();

        assert_eq!(graph.len(), 8);
        assert!(graph
            .get("unzip_batch")
            .unwrap()
            .dependencies
            .contains("report_context"));
        assert!(graph
            .get("create_schema")
            .unwrap()
            .dependencies
            .contains("transform_records"));

        let load = graph.get("load_records").unwrap();
        assert!(load.dependencies.contains("create_table"));
        assert!(load.dependencies.contains("transform_records"));

        assert!(graph
            .get("test_models")
            .unwrap()
            .dependencies
            .contains("build_models"));
    }

    #[tokio::test]
    async fn test_end_to_end_ingestion() {
        let fixture = fixture();
        let graph = Arc::new(fixture.pipeline.task_graph().unwrap());
        let executor = Executor::new(graph);

        let snapshot = executor.execute(RunIdentity::new("filings")).await;

        assert_eq!(snapshot.status, RunStatus::Succeeded);
        for step in snapshot.steps.iter() {
            assert_eq!(step.status, StepStatus::Succeeded, "step {}", step.name);
            assert_eq!(step.attempts, 1);
        }

        // The target is self-consistent before the run reports success.
        assert_eq!(fixture.warehouse.row_count(&StorageTarget::Json), 2);
        let rows = fixture
            .warehouse
            .fetch(&StorageTarget::Json, 10, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["tag"], "Assets");

        assert_eq!(
            *fixture.schema_manager.schemas.lock(),
            vec!["DBT_DB.JSON_SCHEMA".to_string()]
        );
        assert_eq!(
            *fixture.schema_manager.tables.lock(),
            vec!["DBT_DB.JSON_SCHEMA.json_sec_data".to_string()]
        );
        assert_eq!(fixture.model_runner.builds.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.model_runner.tests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resumed_run_does_not_reload() {
        let fixture = fixture();
        let graph = Arc::new(fixture.pipeline.task_graph().unwrap());
        let guard = Arc::new(InMemoryIdempotencyStore::new());
        let run_id = Uuid::new_v4();

        let first = Executor::new(graph.clone())
            .with_guard(guard.clone())
            .execute(RunIdentity::with_run_id("filings", run_id))
            .await;
        assert_eq!(first.status, RunStatus::Succeeded);

        let second = Executor::new(graph)
            .with_guard(guard)
            .execute(RunIdentity::with_run_id("filings", run_id))
            .await;
        assert_eq!(second.status, RunStatus::Succeeded);

        // One write, one model build: the resumed run replayed every
        // committed step instead of re-applying its effects.
        assert_eq!(fixture.warehouse.write_calls(), 1);
        assert_eq!(fixture.warehouse.row_count(&StorageTarget::Json), 2);
        assert_eq!(fixture.model_runner.builds.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.model_runner.tests.load(Ordering::SeqCst), 1);
    }
}
