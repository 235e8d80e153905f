//! Node Registry
//!
//! The registry owns every live node and is the only place edges are stored.
//! Handles held by callers are plain `NodeId`s resolved through it.
//!
//! # Propagation Order
//!
//! When a node propagates, the registry computes the affected region:
//!
//! 1. Direct dependents of the changed roots are marked `Dirty`.
//! 2. Their transitive dependents are marked `MaybeDirty`.
//! 3. The region is sorted topologically (dependencies before dependents).
//!
//! The runtime then settles nodes in that order. A `MaybeDirty` node is only
//! re-evaluated if one of its direct dependencies propagates while being
//! settled, at which point `mark_dependents_dirty` upgrades it.
//!
//! A sweep cut short by a panic leaves nodes pending. They are kept in
//! `unsettled` and settled by the next sweep, and outside a sweep a pending
//! dependent no longer counts as covered by one.
//!
//! # Borrowing
//!
//! The registry lives in a thread-local `RefCell`. It must never be borrowed
//! while user code runs (routines, policies, value destructors), because that
//! code reads other nodes through the registry. Every accessor here is short
//! and returns owned data.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use super::node::{DirtyState, Node, NodeBody, NodeId, NodeState, Reads};
use super::snapshot::{GraphSnapshot, NodeSnapshot};

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::new());
}

/// Run `f` with exclusive access to this thread's registry.
pub(crate) fn with_registry<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    REGISTRY.with(|registry| f(&mut registry.borrow_mut()))
}

/// What `close` has to visit once a node has been marked invalidated.
pub(crate) struct ClosePlan {
    pub dependents: Vec<NodeId>,
    pub fields: SmallVec<[NodeId; 4]>,
}

/// Arena of nodes keyed by ID.
#[derive(Default)]
pub(crate) struct Registry {
    nodes: IndexMap<NodeId, Node>,

    /// Sweeps currently running on this thread.
    sweep_depth: usize,

    /// Nodes left pending by an interrupted sweep.
    unsettled: IndexSet<NodeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            sweep_depth: 0,
            unsettled: IndexSet::new(),
        }
    }

    /// Add a node to the graph.
    ///
    /// A field whose owner is already registered is bound to it here.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id();
        let owner = node.owner();
        self.nodes.insert(id, node);
        if let Some(owner) = owner {
            if let Some(owner) = self.nodes.get_mut(&owner) {
                owner.add_field(id);
            }
        }
        id
    }

    /// Remove a node from the graph, together with every edge touching it.
    pub fn remove(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.swap_remove(&node_id)?;
        self.unsettled.shift_remove(&node_id);

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        if let Some(owner) = node.owner() {
            if let Some(owner) = self.nodes.get_mut(&owner) {
                owner.remove_field(node_id);
            }
        }

        Some(node)
    }

    /// Remove every node. The caller drops them once the borrow is released.
    pub fn drain(&mut self) -> Vec<Node> {
        self.unsettled.clear();
        self.nodes.drain(..).map(|(_, node)| node).collect()
    }

    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Lifecycle state, with `Closed` for unknown IDs.
    pub fn state(&self, node_id: NodeId) -> NodeState {
        self.nodes
            .get(&node_id)
            .map_or(NodeState::Closed, Node::state)
    }

    /// Body of a node that is still active.
    pub fn active_body(&self, node_id: NodeId) -> Option<Rc<dyn NodeBody>> {
        self.nodes
            .get(&node_id)
            .filter(|node| node.is_active())
            .map(Node::body)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Both ends must be registered; otherwise nothing is recorded, which
    /// keeps the two directions symmetric.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace a node's outgoing edges with the reads of its latest evaluation.
    pub fn replace_dependencies(&mut self, node_id: NodeId, reads: Reads) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };

        let stale: SmallVec<[NodeId; 8]> = node
            .dependencies()
            .iter()
            .filter(|dep| !reads.nodes.contains(*dep))
            .copied()
            .collect();

        for dep in stale {
            self.remove_edge(dep, node_id);
        }
        for &dep in &reads.nodes {
            self.add_edge(dep, node_id);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.observe(&reads.nodes, reads.values);
        }
    }

    /// Mark the dependents of the changed roots and return them in
    /// dependency order.
    pub fn mark_changed(&mut self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut to_process = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if let Some(node) = self.nodes.get(root) {
                for dependent_id in node.dependents() {
                    queue.push_back((*dependent_id, true));
                }
            }
        }

        while let Some((node_id, direct)) = queue.pop_front() {
            if roots.contains(&node_id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if !node.is_active() {
                continue;
            }

            if direct {
                node.mark_dirty();
            } else {
                node.mark_maybe_dirty();
            }

            if !visited.insert(node_id) {
                continue;
            }
            to_process.push(node_id);

            for dependent_id in node.dependents() {
                queue.push_back((*dependent_id, false));
            }
        }

        self.topological_sort(to_process)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent_id);
                        }
                    }
                }
            }
        }

        // Only reachable with a cycle, which reset rejects. Settling still
        // orders these through their pending dependencies.
        if result.len() < in_degree.len() {
            let placed: HashSet<_> = result.iter().copied().collect();
            result.extend(nodes.into_iter().filter(|id| !placed.contains(id)));
        }

        result
    }

    /// Dependencies of a pending node that are themselves still pending.
    ///
    /// Returns `None` when the node is clean or gone.
    pub fn pending_dependencies(&self, node_id: NodeId) -> Option<SmallVec<[NodeId; 8]>> {
        let node = self.nodes.get(&node_id)?;
        if !node.is_pending() {
            return None;
        }
        Some(
            node.dependencies()
                .iter()
                .filter(|dep| self.nodes.get(*dep).is_some_and(Node::is_pending))
                .copied()
                .collect(),
        )
    }

    /// Mark a node clean, returning whether it needs to re-evaluate.
    pub fn take_dirty(&mut self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return false;
        };
        let dirty = node.dirty_state() == DirtyState::Dirty && node.is_active();
        node.mark_clean();
        dirty
    }

    /// Enter a sweep, returning the nodes an interrupted one left pending.
    pub fn begin_sweep(&mut self) -> Vec<NodeId> {
        self.sweep_depth += 1;
        self.unsettled.drain(..).collect()
    }

    /// Leave a sweep. When it was interrupted, the nodes of `order` still
    /// pending are kept for the next one.
    pub fn end_sweep(&mut self, order: &[NodeId], interrupted: bool) {
        self.sweep_depth = self.sweep_depth.saturating_sub(1);
        if !interrupted {
            return;
        }
        for &node_id in order {
            if self.nodes.get(&node_id).is_some_and(Node::is_pending) {
                self.unsettled.insert(node_id);
            }
        }
    }

    /// Upgrade the pending dependents of a node that just propagated.
    ///
    /// Returns `true` if some active dependent is not covered by a running
    /// sweep, in which case the caller starts a new sweep from this node.
    pub fn mark_dependents_dirty(&mut self, node_id: NodeId) -> bool {
        let dependents: SmallVec<[NodeId; 8]> = match self.nodes.get(&node_id) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return false,
        };

        let in_sweep = self.sweep_depth > 0;
        let mut outside_sweep = false;
        for dependent_id in dependents {
            let Some(dependent) = self.nodes.get_mut(&dependent_id) else {
                continue;
            };
            if !dependent.is_active() {
                continue;
            }
            if dependent.is_pending() {
                dependent.mark_dirty();
                outside_sweep |= !in_sweep;
            } else {
                outside_sweep = true;
            }
        }
        outside_sweep
    }

    /// Whether `target` is reachable from `from` by following dependency edges.
    pub fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(node_id) = stack.pop() {
            if node_id == target {
                return true;
            }
            if !seen.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                stack.extend(node.dependencies().iter().copied());
            }
        }
        false
    }

    /// First candidate dependency through which `node_id` would depend on itself.
    pub fn find_cycle(&self, node_id: NodeId, candidates: &IndexSet<NodeId>) -> Option<NodeId> {
        candidates
            .iter()
            .copied()
            .find(|&candidate| candidate == node_id || self.reaches(candidate, node_id))
    }

    /// Start closing a node: mark it invalidated and report what the
    /// cascade must visit. Returns `None` if the node is gone or already
    /// being closed.
    pub fn begin_close(&mut self, node_id: NodeId) -> Option<ClosePlan> {
        let node = self.nodes.get_mut(&node_id)?;
        if !node.is_active() {
            return None;
        }
        node.invalidate();
        Some(ClosePlan {
            dependents: node.dependents().iter().copied().collect(),
            fields: node.fields().iter().copied().collect(),
        })
    }

    /// Introspection copy of the live graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|node| NodeSnapshot {
                id: node.id(),
                name: node.name().map(str::to_owned),
                kind: node.kind(),
                state: node.state(),
                value_type: node.body().value_type(),
                dependencies: node.dependencies().iter().copied().collect(),
                dependents: node.dependents().iter().copied().collect(),
                owner: node.owner(),
                fields: node.fields().to_vec(),
                frozen: {
                    let mut frozen: Vec<_> = node.frozen_ids().collect();
                    frozen.sort();
                    frozen
                },
            })
            .collect();
        nodes.sort_by_key(|node| node.id);
        GraphSnapshot { nodes }
    }
}
