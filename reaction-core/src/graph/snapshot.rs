//! Graph Snapshots
//!
//! A serializable copy of the registry's current shape, for diagnostics and
//! tests. Values themselves are not captured, only their type names.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::node::{NodeId, NodeKind, NodeState};

/// One node as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: NodeKind,
    pub state: NodeState,
    pub value_type: &'static str,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<NodeId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<NodeId>,
    /// Closed dependencies whose last value this node keeps.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frozen: Vec<NodeId>,
}

/// The live graph of the current thread, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.dependencies.len()).sum()
    }

    /// Every dependency edge has a matching dependent edge and vice versa,
    /// and no edge points at a node missing from the snapshot.
    pub fn is_consistent(&self) -> bool {
        let by_id: HashMap<NodeId, &NodeSnapshot> =
            self.nodes.iter().map(|node| (node.id, node)).collect();

        self.nodes.iter().all(|node| {
            let forward = node.dependencies.iter().all(|dep| {
                by_id
                    .get(dep)
                    .is_some_and(|dep| dep.dependents.contains(&node.id))
            });
            let backward = node.dependents.iter().all(|dependent| {
                by_id
                    .get(dependent)
                    .is_some_and(|dependent| dependent.dependencies.contains(&node.id))
            });
            forward && backward
        })
    }

    /// The dependency relation contains no cycle.
    pub fn is_acyclic(&self) -> bool {
        let ids: HashSet<NodeId> = self.nodes.iter().map(|node| node.id).collect();
        let mut in_degree: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|node| {
                let degree = node.dependencies.iter().filter(|d| ids.contains(d)).count();
                (node.id, degree)
            })
            .collect();

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            let Some(node) = self.node(id) else {
                continue;
            };
            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        visited == self.nodes.len()
    }
}
