//! Dependency graph with wave traversal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::GraphCycleError;

/// Traversal direction over the dependency relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Dependencies before dependents (create, update).
    Forward,
    /// Dependents before dependencies (delete, rollback).
    Reverse,
}

/// A directed graph of "requires" edges between resources.
///
/// Ordered maps keep traversal deterministic for a given declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    requires: BTreeMap<String, BTreeSet<String>>,
    required_by: BTreeMap<String, BTreeSet<String>>,
}

impl Dependencies {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with no edges. Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: impl Into<String>) {
        let node = node.into();
        self.required_by.entry(node.clone()).or_default();
        self.requires.entry(node).or_default();
    }

    /// Records that `requirer` requires `required`, adding both nodes.
    pub fn add_edge(&mut self, requirer: impl Into<String>, required: impl Into<String>) {
        let requirer = requirer.into();
        let required = required.into();
        self.add_node(requirer.clone());
        self.add_node(required.clone());
        self.requires
            .entry(requirer.clone())
            .or_default()
            .insert(required.clone());
        self.required_by.entry(required).or_default().insert(requirer);
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requires.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty()
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains(&self, node: &str) -> bool {
        self.requires.contains_key(node)
    }

    /// Iterates nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.requires.keys().map(String::as_str)
    }

    /// Returns every `(requirer, required)` edge.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        self.requires
            .iter()
            .flat_map(|(requirer, required)| {
                required
                    .iter()
                    .map(move |target| (requirer.clone(), target.clone()))
            })
            .collect()
    }

    /// Nodes the given node requires.
    #[must_use]
    pub fn requires(&self, node: &str) -> Vec<&str> {
        self.requires
            .get(node)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes that require the given node.
    #[must_use]
    pub fn required_by(&self, node: &str) -> Vec<&str> {
        self.required_by
            .get(node)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes that must finish before `node` when walking in `direction`.
    #[must_use]
    pub fn predecessors(&self, node: &str, direction: Direction) -> Vec<&str> {
        match direction {
            Direction::Forward => self.requires(node),
            Direction::Reverse => self.required_by(node),
        }
    }

    /// Nodes that wait on `node` when walking in `direction`.
    #[must_use]
    pub fn successors(&self, node: &str, direction: Direction) -> Vec<&str> {
        match direction {
            Direction::Forward => self.required_by(node),
            Direction::Reverse => self.requires(node),
        }
    }

    /// Returns a graph restricted to `keep`, dropping edges that leave it.
    #[must_use]
    pub fn subgraph(&self, keep: &BTreeSet<String>) -> Self {
        let mut graph = Self::new();
        for node in self.nodes().filter(|node| keep.contains(*node)) {
            graph.add_node(node);
            for required in self.requires(node) {
                if keep.contains(required) {
                    graph.add_edge(node, required);
                }
            }
        }
        graph
    }

    /// Fails with the first cycle found, if any.
    pub fn validate(&self) -> Result<(), GraphCycleError> {
        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut path = Vec::new();

        for node in self.requires.keys() {
            if !visited.contains(node.as_str()) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack, &mut path) {
                    return Err(GraphCycleError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        rec_stack: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        for dep in self.requires(node) {
            if !visited.contains(dep) {
                if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(ToString::to_string).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    /// Groups nodes into waves: every predecessor of a node (per `direction`)
    /// appears in an earlier wave. Nodes within a wave are sorted by name.
    pub fn traverse(&self, direction: Direction) -> Result<Vec<Vec<String>>, GraphCycleError> {
        self.validate()?;

        let mut remaining: BTreeMap<&str, usize> = self
            .nodes()
            .map(|node| (node, self.predecessors(node, direction).len()))
            .collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let wave: Vec<&str> = remaining
                .iter()
                .filter(|(_, &count)| count == 0)
                .map(|(node, _)| *node)
                .collect();

            if wave.is_empty() {
                // validate() above rules this out; report the leftovers anyway
                let mut stuck: Vec<String> = remaining.keys().map(ToString::to_string).collect();
                if let Some(first) = stuck.first().cloned() {
                    stuck.push(first);
                }
                return Err(GraphCycleError::new(stuck));
            }

            for node in &wave {
                remaining.remove(node);
                for next in self.successors(node, direction) {
                    if let Some(count) = remaining.get_mut(next) {
                        *count = count.saturating_sub(1);
                    }
                }
            }

            waves.push(wave.into_iter().map(ToString::to_string).collect());
        }

        Ok(waves)
    }

    /// Flattened traversal order.
    pub fn order(&self, direction: Direction) -> Result<Vec<String>, GraphCycleError> {
        Ok(self.traverse(direction)?.into_iter().flatten().collect())
    }
}

impl fmt::Display for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (requirer, required) in &self.requires {
            let deps: Vec<&str> = required.iter().map(String::as_str).collect();
            writeln!(f, "{requirer}: [{}]", deps.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diamond() -> Dependencies {
        // top requires left and right, both require base
        let mut graph = Dependencies::new();
        graph.add_edge("top", "left");
        graph.add_edge("top", "right");
        graph.add_edge("left", "base");
        graph.add_edge("right", "base");
        graph
    }

    fn waves(expected: &[&[&str]]) -> Vec<Vec<String>> {
        expected
            .iter()
            .map(|wave| wave.iter().map(ToString::to_string).collect())
            .collect()
    }

    #[test]
    fn test_forward_waves() {
        assert_eq!(
            diamond().traverse(Direction::Forward).unwrap(),
            waves(&[&["base"], &["left", "right"], &["top"]])
        );
    }

    #[test]
    fn test_reverse_waves() {
        assert_eq!(
            diamond().traverse(Direction::Reverse).unwrap(),
            waves(&[&["top"], &["left", "right"], &["base"]])
        );
    }

    #[test]
    fn test_edges_and_neighbours() {
        let graph = diamond();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edges().len(), 4);
        assert_eq!(graph.requires("top"), vec!["left", "right"]);
        assert_eq!(graph.required_by("base"), vec!["left", "right"]);
        assert_eq!(graph.predecessors("base", Direction::Reverse), vec!["left", "right"]);
        assert!(graph.predecessors("base", Direction::Forward).is_empty());
    }

    #[test]
    fn test_isolated_nodes() {
        let mut graph = Dependencies::new();
        graph.add_node("b");
        graph.add_node("a");
        assert_eq!(graph.traverse(Direction::Forward).unwrap(), waves(&[&["a", "b"]]));
    }

    #[test]
    fn test_empty_graph() {
        let graph = Dependencies::new();
        assert!(graph.is_empty());
        assert!(graph.traverse(Direction::Forward).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = Dependencies::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "a");
        graph.add_node("d");

        let err = graph.traverse(Direction::Reverse).unwrap_err();
        assert_eq!(err.cycle_path, vec!["a", "b", "c", "a"]);
        assert_eq!(err.nodes().len(), 3);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut graph = Dependencies::new();
        graph.add_edge("a", "a");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_subgraph() {
        let keep: BTreeSet<String> = ["top", "left"].iter().map(ToString::to_string).collect();
        let sub = diamond().subgraph(&keep);

        assert_eq!(sub.len(), 2);
        assert_eq!(sub.edges(), vec![("top".to_string(), "left".to_string())]);
    }
}
