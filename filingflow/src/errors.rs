//! Error types for the filingflow orchestration core.
//!
//! Graph-construction errors are fatal and surfaced before any run is
//! created. Step errors carry a transient/fatal classification that the
//! retry policy consults; unclassified errors default to transient.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing a task graph.
///
/// These abort the run before any step executes; they are never
/// recorded on a step result.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// Adding the step or edge would create a dependency cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle {
        /// The path of step names forming the cycle.
        path: Vec<String>,
    },

    /// A declared dependency references a step that is not yet defined.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// The step declaring the dependency.
        step: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// A step with the same name is already defined.
    #[error("step '{0}' is already defined")]
    DuplicateStep(String),

    /// An edge references a step that is not defined.
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// The step name is empty or whitespace-only.
    #[error("step name cannot be empty")]
    EmptyName,
}

impl GraphError {
    /// Creates a cycle error from the offending path.
    #[must_use]
    pub fn cycle(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Cycle {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an unknown-dependency error.
    #[must_use]
    pub fn unknown_dependency(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            step: step.into(),
            dependency: dependency.into(),
        }
    }
}

/// Classification of a step error, consulted by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Worth retrying: network hiccups, lock contention, timeouts.
    Transient,
    /// Never retried: schema violations, malformed input, corruption.
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// An error returned by a step action.
///
/// Actions classify their own failures; anything arriving without a
/// classification (e.g. via [`From<anyhow::Error>`]) is treated as
/// transient so the retry policy gets a chance to recover it.
#[derive(Debug, Clone, Error)]
#[error("{class} error: {message}")]
pub struct StepError {
    /// The retryable/fatal classification.
    pub class: ErrorClass,
    /// Human-readable description of the failure.
    pub message: String,
}

impl StepError {
    /// Creates a transient (retryable) step error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    /// Creates a fatal (non-retryable) step error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Fatal,
            message: message.into(),
        }
    }

    /// Returns true if the error is classified fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class == ErrorClass::Fatal
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(format!("{err:#}"))
    }
}

/// The umbrella error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Graph construction failed; no run was created.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A step failed terminally.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// The failing step name.
        step: String,
        /// The terminal step error.
        source: StepError,
    },

    /// The run was cancelled before completion.
    #[error("run cancelled: {0}")]
    Cancelled(String),

    /// An unrecoverable internal error (programming error class).
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_display() {
        let err = GraphError::cycle(["a", "b", "c", "a"]);
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_unknown_dependency_display() {
        let err = GraphError::unknown_dependency("load", "transform");
        assert!(err.to_string().contains("load"));
        assert!(err.to_string().contains("transform"));
    }

    #[test]
    fn test_step_error_classification() {
        assert!(!StepError::transient("timeout").is_fatal());
        assert!(StepError::fatal("bad schema").is_fatal());
    }

    #[test]
    fn test_unclassified_errors_default_to_transient() {
        let err: StepError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.class, ErrorClass::Transient);
        assert!(err.message.contains("connection reset"));
    }

    #[test]
    fn test_error_class_serialize() {
        let json = serde_json::to_string(&ErrorClass::Fatal).unwrap();
        assert_eq!(json, r#""fatal""#);
    }

    #[test]
    fn test_pipeline_error_from_graph_error() {
        let err: PipelineError = GraphError::DuplicateStep("load".to_string()).into();
        assert!(matches!(err, PipelineError::Graph(_)));
    }
}
