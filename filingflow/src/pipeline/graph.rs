//! Directed acyclic graph of named steps.

use super::StepSpec;
use crate::core::{StepResult, StepStatus};
use crate::errors::GraphError;
use std::collections::{BTreeMap, BTreeSet};

/// A validated DAG of steps defining execution order.
///
/// Validation happens at construction: adding a step with an undefined
/// dependency or an edge that would close a cycle fails and leaves the
/// graph unchanged. Once a run starts the graph is shared read-only.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    name: String,
    steps: BTreeMap<String, StepSpec>,
}

impl TaskGraph {
    /// Creates an empty graph for a named pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: BTreeMap::new(),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns a step specification by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepSpec> {
        self.steps.get(name)
    }

    /// Returns true if a step with the given name is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Iterates step names in lexicographic order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Iterates step specifications in lexicographic name order.
    pub fn steps(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.values()
    }

    /// Adds a step to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateStep`] if the name is taken,
    /// [`GraphError::UnknownDependency`] if a declared dependency is
    /// not yet defined, or [`GraphError::Cycle`] for a self-dependency.
    /// On error the graph is left unchanged.
    pub fn add_step(&mut self, spec: StepSpec) -> Result<(), GraphError> {
        spec.validate()?;
        if self.steps.contains_key(&spec.name) {
            return Err(GraphError::DuplicateStep(spec.name));
        }
        for dep in &spec.dependencies {
            if !self.steps.contains_key(dep) {
                return Err(GraphError::unknown_dependency(&spec.name, dep));
            }
        }
        self.steps.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Adds a dependency edge between two existing steps.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownStep`] if either step is undefined,
    /// or [`GraphError::Cycle`] if the edge would close a cycle. On
    /// error the graph is left unchanged.
    pub fn add_dependency(
        &mut self,
        step: impl AsRef<str>,
        dep: impl AsRef<str>,
    ) -> Result<(), GraphError> {
        let step = step.as_ref();
        let dep = dep.as_ref();

        if !self.steps.contains_key(step) {
            return Err(GraphError::UnknownStep(step.to_string()));
        }
        if !self.steps.contains_key(dep) {
            return Err(GraphError::UnknownStep(dep.to_string()));
        }
        if step == dep {
            return Err(GraphError::cycle([step, dep]));
        }
        if let Some(path) = self.dependency_path(dep, step) {
            let mut cycle = vec![step.to_string()];
            cycle.extend(path);
            return Err(GraphError::Cycle { path: cycle });
        }

        if let Some(spec) = self.steps.get_mut(step) {
            spec.dependencies.insert(dep.to_string());
        }
        Ok(())
    }

    /// Returns the steps ready to run: pending, with every dependency
    /// succeeded. Ordered lexicographically by name so dispatch order
    /// is deterministic.
    #[must_use]
    pub fn ready_steps<'a>(&'a self, results: &BTreeMap<String, StepResult>) -> Vec<&'a StepSpec> {
        self.steps
            .values()
            .filter(|spec| {
                results
                    .get(&spec.name)
                    .is_some_and(|r| r.status == StepStatus::Pending)
                    && spec.dependencies.iter().all(|dep| {
                        results
                            .get(dep)
                            .is_some_and(|r| r.status == StepStatus::Succeeded)
                    })
            })
            .collect()
    }

    /// Returns true when no step is pending or running and the run can
    /// be finalized: either every step succeeded or at least one
    /// failed.
    #[must_use]
    pub fn is_terminal(&self, results: &BTreeMap<String, StepResult>) -> bool {
        let none_active = self.steps.keys().all(|name| {
            results.get(name).is_some_and(|r| {
                !matches!(r.status, StepStatus::Pending | StepStatus::Running)
            })
        });
        if !none_active {
            return false;
        }

        let all_succeeded = self
            .steps
            .keys()
            .all(|name| results.get(name).is_some_and(StepResult::is_success));
        let any_failed = self.steps.keys().any(|name| {
            results
                .get(name)
                .is_some_and(|r| r.status == StepStatus::Failed)
        });

        all_succeeded || any_failed
    }

    /// Returns every step that depends, directly or transitively, on
    /// the given step.
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut dependents = BTreeSet::new();
        let mut frontier = vec![name.to_string()];

        while let Some(current) = frontier.pop() {
            for (candidate, spec) in &self.steps {
                if spec.dependencies.contains(&current) && dependents.insert(candidate.clone()) {
                    frontier.push(candidate.clone());
                }
            }
        }

        dependents
    }

    /// Finds a path `from -> ... -> to` along dependency edges, if one
    /// exists.
    fn dependency_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let spec = self.steps.get(from)?;
        for dep in &spec.dependencies {
            if let Some(mut path) = self.dependency_path(dep, to) {
                path.insert(0, from.to_string());
                return Some(path);
            }
        }
        None
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

    fn pending_results(graph: &TaskGraph) -> BTreeMap<String, StepResult> {
        graph
            .step_names()
            .map(|name| (name.to_string(), StepResult::pending(name)))
            .collect()
    }

    fn chain_graph() -> TaskGraph {
        let mut graph = TaskGraph::new("test");
        graph.add_step(noop_spec("extract")).unwrap();
        graph
            .add_step(noop_spec("transform").with_dependency("extract"))
            .unwrap();
        graph
            .add_step(noop_spec("load").with_dependency("transform"))
            .unwrap();
        graph
    }

    #[test]
    fn test_add_step_unknown_dependency() {
        let mut graph = TaskGraph::new("test");
        let err = graph
            .add_step(noop_spec("transform").with_dependency("extract"))
            .unwrap_err();

        assert!(matches!(err, GraphError::UnknownDependency { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_step_duplicate() {
        let mut graph = TaskGraph::new("test");
        graph.add_step(noop_spec("extract")).unwrap();
        let err = graph.add_step(noop_spec("extract")).unwrap_err();

        assert!(matches!(err, GraphError::DuplicateStep(_)));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = TaskGraph::new("test");
        let err = graph
            .add_step(noop_spec("extract").with_dependency("extract"))
            .unwrap_err();

        assert!(matches!(err, GraphError::Cycle { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cycle_via_edge_leaves_graph_unchanged() {
        let mut graph = chain_graph();

        // load -> transform -> extract already holds; extract -> load
        // would close the loop.
        let err = graph.add_dependency("extract", "load").unwrap_err();
        match err {
            GraphError::Cycle { path } => {
                assert_eq!(path.first().map(String::as_str), Some("extract"));
                assert_eq!(path.last().map(String::as_str), Some("extract"));
            }
            other => panic!("expected cycle, got {other}"),
        }

        let extract = graph.get("extract").unwrap();
        assert!(extract.dependencies.is_empty());
    }

    #[test]
    fn test_add_dependency_unknown_step() {
        let mut graph = chain_graph();
        assert!(matches!(
            graph.add_dependency("load", "missing"),
            Err(GraphError::UnknownStep(_))
        ));
        assert!(matches!(
            graph.add_dependency("missing", "load"),
            Err(GraphError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_ready_steps_initial() {
        let graph = chain_graph();
        let results = pending_results(&graph);

        let ready = graph.ready_steps(&results);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "extract");
    }

    #[test]
    fn test_ready_steps_never_precede_dependencies() {
        let graph = chain_graph();
        let mut results = pending_results(&graph);

        // transform is running; load's dependency has not succeeded.
        results.get_mut("extract").unwrap().start();
        results
            .get_mut("extract")
            .unwrap()
            .succeed(crate::core::StepOutput::empty(), 1);
        results.get_mut("transform").unwrap().start();

        let ready = graph.ready_steps(&results);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_ready_steps_lexicographic_order() {
        let mut graph = TaskGraph::new("test");
        graph.add_step(noop_spec("zeta")).unwrap();
        graph.add_step(noop_spec("alpha")).unwrap();
        graph.add_step(noop_spec("mike")).unwrap();
        let results = pending_results(&graph);

        let names: Vec<&str> = graph
            .ready_steps(&results)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "mike", "zeta"]);
    }

    #[test]
    fn test_is_terminal() {
        let graph = chain_graph();
        let mut results = pending_results(&graph);
        assert!(!graph.is_terminal(&results));

        for name in ["extract", "transform", "load"] {
            results.get_mut(name).unwrap().start();
            results
                .get_mut(name)
                .unwrap()
                .succeed(crate::core::StepOutput::empty(), 1);
        }
        assert!(graph.is_terminal(&results));
    }

    #[test]
    fn test_is_terminal_with_failure_and_skips() {
        let graph = chain_graph();
        let mut results = pending_results(&graph);

        results.get_mut("extract").unwrap().start();
        results.get_mut("extract").unwrap().fail("boom", 1);
        results.get_mut("transform").unwrap().skip("extract");
        results.get_mut("load").unwrap().skip("extract");

        assert!(graph.is_terminal(&results));
    }

    #[test]
    fn test_transitive_dependents_diamond() {
        let mut graph = TaskGraph::new("diamond");
        graph.add_step(noop_spec("a")).unwrap();
        graph.add_step(noop_spec("b").with_dependency("a")).unwrap();
        graph.add_step(noop_spec("c").with_dependency("a")).unwrap();
        graph
            .add_step(noop_spec("d").with_dependencies(["b", "c"]))
            .unwrap();

        let of_b = graph.transitive_dependents("b");
        assert_eq!(of_b, BTreeSet::from(["d".to_string()]));

        let of_a = graph.transitive_dependents("a");
        assert_eq!(
            of_a,
            BTreeSet::from(["b".to_string(), "c".to_string(), "d".to_string()])
        );
    }
}
