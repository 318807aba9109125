//! Step action trait and basic implementations.
//!
//! Actions are the externally supplied bodies of pipeline steps. The
//! same contract covers in-process transforms and steps that wrap an
//! external process invocation, so retry and idempotency policy apply
//! uniformly to both.

use crate::context::StepContext;
use crate::core::StepOutput;
use crate::errors::StepError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// The body of a pipeline step.
///
/// Implementations must classify their failures transient or fatal via
/// [`StepError`]; unclassified errors are treated as transient.
#[async_trait]
pub trait StepAction: Send + Sync + Debug {
    /// Executes the step.
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

/// Shared, type-erased handle to a step action.
pub type BoxedAction = Arc<dyn StepAction>;

/// A synchronous closure wrapped as a step action.
pub struct FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    /// Creates a function-based step action.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StepAction for FnStep<F>
where
    F: Fn(&StepContext) -> Result<StepOutput, StepError> + Send + Sync,
{
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        (self.func)(ctx)
    }
}

/// A step action that succeeds with no output.
#[derive(Debug, Clone, Default)]
pub struct NoOpStep;

impl NoOpStep {
    /// Creates a no-op step action.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepAction for NoOpStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
        Ok(StepOutput::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RunIdentity, StepInputs};
    use std::collections::BTreeMap;

    fn test_context(step: &str) -> StepContext {
        StepContext::new(
            RunIdentity::new("test"),
            step,
            StepInputs::default(),
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_fn_step() {
        let action = FnStep::new("double", |ctx| {
            let n = ctx
                .config("n")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
            Ok(StepOutput::value("doubled", serde_json::json!(n * 2)))
        });

        let mut config = BTreeMap::new();
        config.insert("n".to_string(), serde_json::json!(21));
        let ctx = StepContext::new(
            RunIdentity::new("test"),
            "double",
            StepInputs::default(),
            config,
        );

        let output = action.run(&ctx).await.unwrap();
        assert_eq!(output.get("doubled"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn test_fn_step_error_passthrough() {
        let action = FnStep::new("broken", |_ctx| Err(StepError::fatal("malformed input")));
        let err = action.run(&test_context("broken")).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_noop_step() {
        let action = NoOpStep::new();
        let output = action.run(&test_context("noop")).await.unwrap();
        assert!(output.is_empty());
    }
}
