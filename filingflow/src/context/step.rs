//! Execution context handed to a step action.

use super::{RunIdentity, StepInputs};
use std::collections::BTreeMap;

/// Everything a step action may read while executing.
///
/// The context is built by the executor immediately before dispatch and
/// owned by the action for the duration of the attempt; it is immutable,
/// so retries of the same attempt see identical inputs.
#[derive(Debug, Clone)]
pub struct StepContext {
    run: RunIdentity,
    step_name: String,
    inputs: StepInputs,
    config: BTreeMap<String, serde_json::Value>,
}

impl StepContext {
    /// Creates a step context.
    #[must_use]
    pub fn new(
        run: RunIdentity,
        step_name: impl Into<String>,
        inputs: StepInputs,
        config: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            run,
            step_name: step_name.into(),
            inputs,
            config,
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub fn run(&self) -> &RunIdentity {
        &self.run
    }

    /// Returns the executing step's name.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the upstream outputs view.
    #[must_use]
    pub fn inputs(&self) -> &StepInputs {
        &self.inputs
    }

    /// Returns an injected configuration value.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    /// Returns the full configuration map.
    #[must_use]
    pub fn config_map(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let run = RunIdentity::new("filings");
        let mut config = BTreeMap::new();
        config.insert("batch".to_string(), serde_json::json!("2021q4"));

        let ctx = StepContext::new(run.clone(), "unzip", StepInputs::default(), config);

        assert_eq!(ctx.step_name(), "unzip");
        assert_eq!(ctx.run().run_id, run.run_id);
        assert_eq!(ctx.config("batch"), Some(&serde_json::json!("2021q4")));
        assert!(ctx.config("missing").is_none());
    }
}
