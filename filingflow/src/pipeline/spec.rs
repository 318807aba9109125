//! Step specification: identity, action, dependencies and policy.

use super::RetryPolicy;
use crate::errors::GraphError;
use crate::steps::BoxedAction;
use std::collections::BTreeSet;

/// Specification for a single step in a task graph.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// The unique step name.
    pub name: String,
    /// The action the step performs.
    pub action: BoxedAction,
    /// Names of steps this step depends on.
    pub dependencies: BTreeSet<String>,
    /// Retry policy applied to this step's failures.
    pub retry: RetryPolicy,
    /// Static components of the step's input fingerprint (e.g. the
    /// source batch identifier and transform version). When empty, the
    /// fingerprint is derived from the step's upstream outputs.
    pub fingerprint_inputs: Vec<String>,
}

impl StepSpec {
    /// Creates a step specification with no dependencies and the
    /// default retry policy.
    #[must_use]
    pub fn new(name: impl Into<String>, action: BoxedAction) -> Self {
        Self {
            name: name.into(),
            action,
            dependencies: BTreeSet::new(),
            retry: RetryPolicy::default(),
            fingerprint_inputs: Vec::new(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a static fingerprint component.
    #[must_use]
    pub fn with_fingerprint_input(mut self, component: impl Into<String>) -> Self {
        self.fingerprint_inputs.push(component.into());
        self
    }

    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EmptyName`] for a blank name, or
    /// [`GraphError::Cycle`] if the step depends on itself.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.name.trim().is_empty() {
            return Err(GraphError::EmptyName);
        }
        if self.dependencies.contains(&self.name) {
            return Err(GraphError::cycle([self.name.clone(), self.name.clone()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::NoOpStep;
    use std::sync::Arc;

    fn noop_spec(name: &str) -> StepSpec {
        StepSpec::new(name, Arc::new(NoOpStep::new()))
    }

    #[test]
    fn test_spec_builders() {
        let spec = noop_spec("load")
            .with_dependencies(["transform", "create_table"])
            .with_retry(RetryPolicy::immediate(2))
            .with_fingerprint_input("2021q4");

        assert_eq!(spec.name, "load");
        assert_eq!(spec.dependencies.len(), 2);
        assert_eq!(spec.retry.max_attempts, 2);
        assert_eq!(spec.fingerprint_inputs, vec!["2021q4".to_string()]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let spec = noop_spec("   ");
        assert!(matches!(spec.validate(), Err(GraphError::EmptyName)));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let spec = noop_spec("load").with_dependency("load");
        assert!(matches!(spec.validate(), Err(GraphError::Cycle { .. })));
    }
}
