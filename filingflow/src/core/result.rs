//! Per-step execution record.

use super::{StepOutput, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recorded outcome of one step within a pipeline run.
///
/// Mutated only by the executor; every transition out of `pending` or
/// `running` happens exactly once. The transition methods return `false`
/// when the record is not in the expected source state, which the
/// executor treats as a scheduling bug rather than silently overwriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The step name.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// When the first attempt started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Number of attempts made (0 until the first attempt starts).
    pub attempts: u32,
    /// Message of the last error observed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Root-cause step name when this step was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_because: Option<String>,
    /// Output recorded on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
}

impl StepResult {
    /// Creates a pending record for a step.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            attempts: 0,
            last_error: None,
            skipped_because: None,
            output: None,
        }
    }

    /// Transitions `pending -> running`. Returns false if not pending.
    pub fn start(&mut self) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Transitions `running -> succeeded`, recording output and attempts.
    pub fn succeed(&mut self, output: StepOutput, attempts: u32) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        self.status = StepStatus::Succeeded;
        self.ended_at = Some(Utc::now());
        self.attempts = attempts;
        self.output = Some(output);
        true
    }

    /// Transitions `running -> failed`, recording the terminal error.
    pub fn fail(&mut self, error: impl Into<String>, attempts: u32) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        self.status = StepStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.attempts = attempts;
        self.last_error = Some(error.into());
        true
    }

    /// Transitions `pending -> skipped` with a reference to the
    /// root-cause step. Skipped steps never get their own error.
    pub fn skip(&mut self, root_cause: impl Into<String>) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Skipped;
        self.ended_at = Some(Utc::now());
        self.skipped_because = Some(root_cause.into());
        true
    }

    /// Returns the wall-clock duration in milliseconds, if finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64),
            _ => None,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let result = StepResult::pending("unzip");
        assert_eq!(result.status, StepStatus::Pending);
        assert_eq!(result.attempts, 0);
        assert!(result.started_at.is_none());
    }

    #[test]
    fn test_full_success_transition() {
        let mut result = StepResult::pending("transform");
        assert!(result.start());
        assert!(result.succeed(StepOutput::empty(), 1));

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempts, 1);
        assert!(result.started_at.is_some());
        assert!(result.ended_at.is_some());
        assert!(result.is_success());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut result = StepResult::pending("load");
        assert!(result.start());
        assert!(result.fail("connection reset", 3));

        // No transition leaves a terminal state.
        assert!(!result.start());
        assert!(!result.succeed(StepOutput::empty(), 4));
        assert!(!result.fail("again", 4));
        assert!(!result.skip("load"));
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn test_skip_only_from_pending() {
        let mut result = StepResult::pending("test_models");
        assert!(result.skip("build_models"));
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(result.skipped_because.as_deref(), Some("build_models"));
        assert!(result.last_error.is_none());

        let mut running = StepResult::pending("load");
        running.start();
        assert!(!running.skip("unzip"));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut result = StepResult::pending("unzip");
        assert!(result.start());
        assert!(!result.start());
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let result = StepResult::pending("extract");
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("last_error"));
        assert!(!json.contains("skipped_because"));
    }
}
