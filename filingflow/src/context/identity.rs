//! Run identity for tracking pipeline executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one execution of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// The logical date this run covers (e.g. the filing period close),
    /// as opposed to the wall-clock time it was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl RunIdentity {
    /// Creates a run identity with a generated run ID.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            scheduled_for: None,
        }
    }

    /// Creates a run identity with a specific run ID.
    ///
    /// Resuming a partially failed run reuses the original ID so the
    /// idempotency guard recognizes already-applied steps.
    #[must_use]
    pub fn with_run_id(pipeline: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            scheduled_for: None,
        }
    }

    /// Sets the logical date for the run.
    #[must_use]
    pub fn with_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}
