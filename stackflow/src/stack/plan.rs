//! Turns templates into per-resource operations over a dependency graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::StackflowError;
use crate::graph::{Dependencies, Direction};
use crate::resource::{ResourceDefinition, ResourceOp, StackTemplate};

/// One scheduler run: a graph, its traversal direction and what to do to
/// each node.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) graph: Dependencies,
    pub(crate) direction: Direction,
    pub(crate) ops: BTreeMap<String, (ResourceDefinition, ResourceOp)>,
}

impl Plan {
    /// Creates every resource, dependencies first.
    pub(crate) fn create(template: &StackTemplate) -> Result<Self, StackflowError> {
        let graph = template.dependencies()?;
        let ops = template
            .resources()
            .map(|d| (d.name.clone(), (d.clone(), ResourceOp::Create)))
            .collect();

        Ok(Self {
            graph,
            direction: Direction::Forward,
            ops,
        })
    }

    /// Deletes every resource, dependents first.
    ///
    /// `orphans` are resources known only from their records; they have no
    /// declared edges and are deleted alongside the template's roots.
    pub(crate) fn delete(
        template: &StackTemplate,
        orphans: Vec<ResourceDefinition>,
    ) -> Result<Self, StackflowError> {
        let mut graph = template.dependencies()?;
        let mut ops: BTreeMap<_, _> = template
            .resources()
            .map(|d| (d.name.clone(), (d.clone(), ResourceOp::Delete)))
            .collect();

        for orphan in orphans {
            if graph.contains(&orphan.name) {
                continue;
            }
            graph.add_node(orphan.name.clone());
            ops.insert(orphan.name.clone(), (orphan, ResourceOp::Delete));
        }

        Ok(Self {
            graph,
            direction: Direction::Reverse,
            ops,
        })
    }

    /// Moves a stack from `current` to `target`.
    ///
    /// The first run creates, updates or keeps every resource of `target`
    /// in forward order; the second deletes what `target` no longer declares
    /// in reverse order of `current`.
    pub(crate) fn converge(
        current: &StackTemplate,
        target: &StackTemplate,
    ) -> Result<Vec<Self>, StackflowError> {
        let forward_graph = target.dependencies()?;
        let forward_ops = target
            .resources()
            .map(|d| {
                let op = match current.get(&d.name) {
                    None => ResourceOp::Create,
                    Some(previous) if previous == d => ResourceOp::Keep,
                    Some(previous) => ResourceOp::Update {
                        previous: previous.clone(),
                    },
                };
                (d.name.clone(), (d.clone(), op))
            })
            .collect();

        let removed: BTreeSet<String> = current
            .names()
            .filter(|name| target.get(name).is_none())
            .map(str::to_string)
            .collect();
        let reverse_graph = current.dependencies()?.subgraph(&removed);
        let reverse_ops = current
            .resources()
            .filter(|d| removed.contains(&d.name))
            .map(|d| (d.name.clone(), (d.clone(), ResourceOp::Delete)))
            .collect();

        Ok(vec![
            Self {
                graph: forward_graph,
                direction: Direction::Forward,
                ops: forward_ops,
            },
            Self {
                graph: reverse_graph,
                direction: Direction::Reverse,
                ops: reverse_ops,
            },
        ])
    }
}
