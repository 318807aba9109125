//! Read-only view of upstream step outputs.

use crate::core::StepOutput;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Error raised when a step reads an output it never declared.
#[derive(Debug, Clone, Error)]
#[error("step '{step}' read output of '{upstream}' without declaring it as a dependency")]
pub struct UndeclaredInputError {
    /// The step attempting the read.
    pub step: String,
    /// The upstream step being read.
    pub upstream: String,
}

/// The upstream outputs available to a step action.
///
/// Only outputs of declared dependencies are readable; an undeclared
/// read is a wiring mistake and fails loudly instead of returning
/// whatever happened to be finished.
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    outputs: BTreeMap<String, StepOutput>,
    declared: BTreeSet<String>,
    step: String,
}

impl StepInputs {
    /// Creates inputs for a step from its declared dependencies' outputs.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        declared: BTreeSet<String>,
        outputs: BTreeMap<String, StepOutput>,
    ) -> Self {
        Self {
            outputs,
            declared,
            step: step.into(),
        }
    }

    /// Gets the full output of an upstream step.
    ///
    /// # Errors
    ///
    /// Returns [`UndeclaredInputError`] if `upstream` was not declared
    /// as a dependency of this step.
    pub fn get(&self, upstream: &str) -> Result<Option<&StepOutput>, UndeclaredInputError> {
        if !self.declared.contains(upstream) {
            return Err(UndeclaredInputError {
                step: self.step.clone(),
                upstream: upstream.to_string(),
            });
        }
        Ok(self.outputs.get(upstream))
    }

    /// Gets a single value out of an upstream step's output.
    ///
    /// # Errors
    ///
    /// Returns [`UndeclaredInputError`] if `upstream` was not declared.
    pub fn get_value(
        &self,
        upstream: &str,
        key: &str,
    ) -> Result<Option<&serde_json::Value>, UndeclaredInputError> {
        Ok(self.get(upstream)?.and_then(|o| o.get(key)))
    }

    /// Returns the declared dependency names.
    #[must_use]
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    /// Returns the outputs map, keyed by upstream step name.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, StepOutput> {
        &self.outputs
    }
}
