//! Ordering of derived definitions so that dependencies are computed first.

use crate::{
    formula::{extract_dependencies, Formula, FormulaError},
    registry::MetricRegistry,
    types::DerivedTimeseriesDefinition,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circular dependency: {}", .cycle.join(" -> "))]
pub struct CircularDependencyError {
    /// Closed path, first and last ids are the same
    pub cycle: Vec<String>,
}

/// Edges between derived definitions.
///
/// References to ids that are not among the definitions (raw metrics)
/// are leaves and do not appear in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build<'a>(
        definitions: impl IntoIterator<Item = &'a DerivedTimeseriesDefinition>,
    ) -> Self {
        let references: BTreeMap<String, BTreeSet<String>> = definitions
            .into_iter()
            .map(|d| (d.id.clone(), extract_dependencies(&d.formula)))
            .collect();
        let edges = references
            .iter()
            .map(|(id, deps)| {
                let deps = deps
                    .iter()
                    .filter(|dep| references.contains_key(*dep))
                    .cloned()
                    .collect();
                (id.clone(), deps)
            })
            .collect();
        Self { edges }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Derived dependencies of `id`
    pub fn dependencies(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(id)
    }

    /// All nodes, each after every node it depends on.
    ///
    /// Depth-first with an explicit stack. Ties are broken by id, so the
    /// order is the same for the same graph.
    pub fn topological_sort(&self) -> Result<Vec<String>, CircularDependencyError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks: HashMap<&str, Mark> =
            self.edges.keys().map(|id| (id.as_str(), Mark::White)).collect();
        let mut order = Vec::with_capacity(self.edges.len());

        for (root, root_deps) in &self.edges {
            if marks.get(root.as_str()) != Some(&Mark::White) {
                continue;
            }
            marks.insert(root, Mark::Gray);
            let mut stack = vec![(root.as_str(), root_deps.iter())];
            while let Some((node, deps)) = stack.last_mut() {
                let node: &str = *node;
                match deps.next() {
                    Some(dep) => match marks.get(dep.as_str()).copied() {
                        Some(Mark::White) => {
                            marks.insert(dep, Mark::Gray);
                            let dep_deps = self.edges.get(dep).map(|d| d.iter());
                            stack.push((dep.as_str(), dep_deps.unwrap_or_default()));
                        }
                        Some(Mark::Gray) => {
                            let start = stack
                                .iter()
                                .position(|(id, _)| *id == dep.as_str())
                                .unwrap_or_default();
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|(id, _)| id.to_string()).collect();
                            cycle.push(dep.clone());
                            return Err(CircularDependencyError { cycle });
                        }
                        Some(Mark::Black) | None => {}
                    },
                    None => {
                        marks.insert(node, Mark::Black);
                        order.push(node.to_string());
                        stack.pop();
                    }
                }
            }
        }
        Ok(order)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionRejection {
    #[error("invalid formula: {0}")]
    InvalidFormula(#[source] FormulaError),
    #[error("references unknown metric '{dependency}'")]
    UnknownDependency { dependency: String },
    #[error(transparent)]
    CircularDependency(#[from] CircularDependencyError),
    #[error("depends on rejected definition '{dependency}'")]
    DependsOnRejected { dependency: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDefinition {
    pub definition: DerivedTimeseriesDefinition,
    pub formula: Formula,
}

/// Derived definitions that can be computed, in dependency order, together
/// with the ones that cannot and the reason for each.
///
/// A broken definition (bad formula, unknown reference, part of a cycle)
/// only takes down itself and definitions that depend on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputationPlan {
    pub steps: Vec<PlannedDefinition>,
    pub rejected: BTreeMap<String, DefinitionRejection>,
}

impl ComputationPlan {
    pub fn build(registry: &MetricRegistry) -> Self {
        let mut rejected = BTreeMap::new();
        let mut accepted: BTreeMap<String, PlannedDefinition> = BTreeMap::new();

        for definition in registry.derived_definitions() {
            let formula = match Formula::parse(&definition.formula) {
                Ok(formula) => formula,
                Err(err) => {
                    rejected.insert(
                        definition.id.clone(),
                        DefinitionRejection::InvalidFormula(err),
                    );
                    continue;
                }
            };
            let unknown = formula
                .dependencies()
                .iter()
                .find(|dep| !registry.is_known(dep));
            if let Some(dependency) = unknown {
                rejected.insert(
                    definition.id.clone(),
                    DefinitionRejection::UnknownDependency {
                        dependency: dependency.clone(),
                    },
                );
                continue;
            }
            accepted.insert(
                definition.id.clone(),
                PlannedDefinition {
                    definition: definition.clone(),
                    formula,
                },
            );
        }

        loop {
            reject_dependents(&mut accepted, &mut rejected);
            let graph = DependencyGraph::build(accepted.values().map(|p| &p.definition));
            match graph.topological_sort() {
                Ok(order) => {
                    let steps = order
                        .into_iter()
                        .filter_map(|id| accepted.remove(&id))
                        .collect();
                    return Self { steps, rejected };
                }
                Err(err) => {
                    for id in &err.cycle {
                        if accepted.remove(id).is_some() {
                            rejected.insert(id.clone(), err.clone().into());
                        }
                    }
                }
            }
        }
    }

    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.definition.id.as_str()).collect()
    }
}

/// Move definitions depending on anything in `rejected` to `rejected`,
/// until there is nothing left to move.
fn reject_dependents(
    accepted: &mut BTreeMap<String, PlannedDefinition>,
    rejected: &mut BTreeMap<String, DefinitionRejection>,
) {
    loop {
        let newly_rejected: Vec<(String, String)> = accepted
            .iter()
            .filter_map(|(id, planned)| {
                planned
                    .formula
                    .dependencies()
                    .iter()
                    .find(|dep| rejected.contains_key(*dep))
                    .map(|dep| (id.clone(), dep.clone()))
            })
            .collect();
        if newly_rejected.is_empty() {
            return;
        }
        for (id, dependency) in newly_rejected {
            accepted.remove(&id);
            rejected.insert(id, DefinitionRejection::DependsOnRejected { dependency });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::registry::{definition, raw_metric};
    use pretty_assertions::assert_eq;

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let definitions = [
            definition("c", "{{b}} + {{a}}"),
            definition("b", "{{a}} * 2"),
            definition("a", "{{gdp}} / 4"),
            definition("d", "{{gdp}}"),
        ];
        let graph = DependencyGraph::build(&definitions);
        assert_eq!(
            graph.dependencies("a").unwrap(),
            &BTreeSet::new(),
            "raw references are leaves"
        );
        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "c"));
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(order, graph.topological_sort().unwrap());
    }

    #[test]
    fn diamond() {
        let definitions = [
            definition("top", "{{left}} + {{right}}"),
            definition("left", "{{base}}"),
            definition("right", "{{base}} * 2"),
            definition("base", "1"),
        ];
        let order = DependencyGraph::build(&definitions)
            .topological_sort()
            .unwrap();
        assert_eq!(order, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn cycle_is_named() {
        let definitions = [definition("a", "{{b}}"), definition("b", "{{a}}")];
        let err = DependencyGraph::build(&definitions)
            .topological_sort()
            .unwrap_err();
        assert_eq!(err.cycle, vec!["a", "b", "a"]);
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");

        let self_reference = [definition("x", "{{x}} + 1")];
        let err = DependencyGraph::build(&self_reference)
            .topological_sort()
            .unwrap_err();
        assert_eq!(err.cycle, vec!["x", "x"]);
    }

    #[test]
    fn cycle_reachable_from_acyclic_prefix() {
        let definitions = [
            definition("a", "{{b}}"),
            definition("b", "{{c}}"),
            definition("c", "{{d}}"),
            definition("d", "{{b}}"),
        ];
        let err = DependencyGraph::build(&definitions)
            .topological_sort()
            .unwrap_err();
        assert_eq!(err.cycle, vec!["b", "c", "d", "b"]);
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let definitions: Vec<_> = (0..10_000)
            .map(|i| definition(&format!("m{i:05}"), &format!("{{{{m{:05}}}}}", i + 1)))
            .collect();
        let order = DependencyGraph::build(&definitions)
            .topological_sort()
            .unwrap();
        assert_eq!(order.first().map(String::as_str), Some("m09999"));
        assert_eq!(order.last().map(String::as_str), Some("m00000"));
    }

    #[test]
    fn plan_isolates_broken_definitions() {
        let registry = MetricRegistry::new(
            [raw_metric("gdp"), raw_metric("debt")],
            [
                definition("ratio", "{{debt}} / {{gdp}} * 100"),
                definition("ratio_pct", "{{ratio}} / 100"),
                definition("loop_a", "{{loop_b}} + {{gdp}}"),
                definition("loop_b", "{{loop_a}}"),
                definition("after_loop", "{{loop_a}} * 2"),
                definition("typo", "{{GDP}} * 2"),
                definition("after_typo", "{{typo}} + 1"),
                definition("broken", "{{gdp}} +"),
            ],
        )
        .unwrap();
        let plan = ComputationPlan::build(&registry);

        assert_eq!(plan.order(), vec!["ratio", "ratio_pct"]);
        let cycle = CircularDependencyError {
            cycle: vec!["loop_a".into(), "loop_b".into(), "loop_a".into()],
        };
        assert_eq!(
            plan.rejected,
            BTreeMap::from([
                (
                    "after_loop".to_string(),
                    DefinitionRejection::DependsOnRejected {
                        dependency: "loop_a".into()
                    }
                ),
                (
                    "after_typo".to_string(),
                    DefinitionRejection::DependsOnRejected {
                        dependency: "typo".into()
                    }
                ),
                (
                    "broken".to_string(),
                    DefinitionRejection::InvalidFormula(FormulaError::UnexpectedEnd)
                ),
                (
                    "loop_a".to_string(),
                    DefinitionRejection::CircularDependency(cycle.clone())
                ),
                (
                    "loop_b".to_string(),
                    DefinitionRejection::CircularDependency(cycle)
                ),
                (
                    "typo".to_string(),
                    DefinitionRejection::UnknownDependency {
                        dependency: "GDP".into()
                    }
                ),
            ])
        );
    }

    #[test]
    fn plan_of_healthy_registry_keeps_everything() {
        let registry = MetricRegistry::new(
            [raw_metric("interest"), raw_metric("expenditures")],
            [
                definition("b", "{{a}} - 1"),
                definition("a", "{{interest}} / {{expenditures}} * 100"),
            ],
        )
        .unwrap();
        let plan = ComputationPlan::build(&registry);
        assert!(plan.rejected.is_empty());
        assert_eq!(plan.order(), vec!["a", "b"]);
        assert_eq!(
            plan.steps[0].formula.dependencies(),
            &BTreeSet::from(["expenditures".to_string(), "interest".to_string()])
        );
    }
}
