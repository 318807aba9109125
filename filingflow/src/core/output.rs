//! Step output type passed between dependent steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a successful step action.
///
/// Outputs are keyed maps of JSON values so heterogeneous steps (extract,
/// transform, load, model-build) can hand results downstream without a
/// shared schema. The map is ordered so serialized outputs, and the
/// input fingerprints derived from them, are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// The output data.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl StepOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an output from a data map.
    #[must_use]
    pub fn new(data: BTreeMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Creates an output holding a single value.
    #[must_use]
    pub fn value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.into(), value);
        Self { data }
    }

    /// Adds a value to the output.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns true if the output carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
