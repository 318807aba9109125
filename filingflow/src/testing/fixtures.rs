//! Graph-building helpers shared by tests.

use crate::pipeline::{StepSpec, TaskGraph};
use crate::steps::{BoxedAction, NoOpStep};
use std::sync::Arc;

/// A no-op step specification.
#[must_use]
pub fn noop_spec(name: &str) -> StepSpec {
    StepSpec::new(name, Arc::new(NoOpStep::new()))
}

/// A step specification wrapping the given action.
#[must_use]
pub fn spec_with(name: &str, action: BoxedAction) -> StepSpec {
    StepSpec::new(name, action)
}

/// Builds a linear chain of no-op steps, each depending on the
/// previous.
///
/// # Panics
///
/// Panics on duplicate names; fixture misuse is a test bug.
#[must_use]
pub fn noop_chain(pipeline: &str, steps: &[&str]) -> TaskGraph {
    let mut graph = TaskGraph::new(pipeline);
    let mut prev: Option<&str> = None;
    for step in steps {
        let mut spec = noop_spec(step);
        if let Some(prev) = prev {
            spec = spec.with_dependency(prev);
        }
        graph.add_step(spec).expect("valid chain fixture");
        prev = Some(step);
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_chain_wiring() {
        let graph = noop_chain("filings", &["extract", "transform", "load"]);

        assert_eq!(graph.len(), 3);
        assert!(graph.get("extract").unwrap().dependencies.is_empty());
        assert!(graph
            .get("load")
            .unwrap()
            .dependencies
            .contains("transform"));
    }
}
