//! Graph Nodes
//!
//! This module defines the vertex record stored in the registry and the
//! type-erased value holder every vertex carries.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::reactive::{InvalidationStrategy, Threshold};

/// Unique identifier for a node in the dependency graph.
///
/// Identifiers are allocated from a process-wide counter and never reused, so
/// a stale handle can never resolve to a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source node. Assigned by the caller, never has dependencies.
    Source,

    /// A computation node. Derived from other nodes by an evaluation routine.
    Computation,

    /// An effect node. A computation kept for its side effects.
    Effect,

    /// A field bound to a member of an aggregate held by a source node.
    Field,
}

impl NodeKind {
    /// Whether nodes of this kind run an evaluation routine.
    pub fn is_computation(self) -> bool {
        matches!(self, Self::Computation | Self::Effect)
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Live: evaluates, propagates, accepts edges.
    Active,

    /// Being closed. The close cascade is visiting its dependents.
    Invalidated,

    /// Removed from the registry. Terminal.
    Closed,
}

/// Dirty state of a node during a propagation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// Some upstream node is part of the current sweep. The node only
    /// re-evaluates if one of its direct dependencies propagates.
    MaybeDirty,

    /// A direct dependency propagated. The node must re-evaluate.
    Dirty,
}

/// Nodes read by one evaluation, with the value each one served.
#[derive(Default)]
pub(crate) struct Reads {
    /// Nodes read, in first-read order.
    pub nodes: IndexSet<NodeId>,
    /// Last value served by each live node read.
    pub values: HashMap<NodeId, Rc<dyn Any>>,
}

/// Outcome of running a node's evaluation routine.
pub(crate) struct Evaluation {
    /// Every node read while the routine ran.
    pub reads: Reads,
    /// Whether the node's trigger policy asked to notify dependents.
    pub propagate: bool,
}

/// Type-erased value holder owned by a node.
///
/// The registry stores heterogeneous nodes; the typed side lives in
/// `reactive::body::ValueCell<T>`.
pub(crate) trait NodeBody {
    fn as_any(&self) -> &dyn Any;

    /// Name of the stored value type, for diagnostics.
    fn value_type(&self) -> &'static str;

    /// Clone of the current value.
    fn snapshot(&self) -> Rc<dyn Any>;

    /// Re-run the evaluation routine and store the result.
    ///
    /// Returns `None` for nodes without a routine, or when the routine is
    /// already running further up the stack.
    fn recompute(&self, id: NodeId) -> Option<Evaluation>;

    /// Consult the trigger policy for a change made behind the node's back
    /// (a field of its aggregate was written).
    fn touch(&self, id: NodeId) -> bool;

    /// The threshold trigger this node was created with, if any.
    fn threshold(&self) -> Option<Threshold>;
}

/// A node in the dependency graph.
pub(crate) struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Optional diagnostic name.
    name: Option<String>,

    /// Lifecycle state.
    state: NodeState,

    /// Current dirty state.
    dirty: DirtyState,

    /// Value holder, routine and trigger policy.
    body: Rc<dyn NodeBody>,

    /// Response to a dependency being closed.
    invalidation: Rc<RefCell<Box<dyn InvalidationStrategy>>>,

    /// Nodes that this node reads from.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read from this node.
    dependents: IndexSet<NodeId>,

    /// Value each dependency served to this node's latest evaluation.
    observed: HashMap<NodeId, Rc<dyn Any>>,

    /// Last values of closed dependencies, kept under `LastVal`.
    frozen: HashMap<NodeId, Rc<dyn Any>>,

    /// Source node whose aggregate this field belongs to.
    owner: Option<NodeId>,

    /// Fields bound to this node's aggregate.
    fields: SmallVec<[NodeId; 4]>,
}

impl Node {
    /// Create a new active node.
    pub fn new(
        id: NodeId,
        kind: NodeKind,
        body: Rc<dyn NodeBody>,
        invalidation: Box<dyn InvalidationStrategy>,
    ) -> Self {
        Self {
            id,
            kind,
            name: None,
            state: NodeState::Active,
            dirty: DirtyState::Clean,
            body,
            invalidation: Rc::new(RefCell::new(invalidation)),
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            observed: HashMap::new(),
            frozen: HashMap::new(),
            owner: None,
            fields: SmallVec::new(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_owner(mut self, owner: Option<NodeId>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_fields(mut self, fields: SmallVec<[NodeId; 4]>) -> Self {
        self.fields = fields;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == NodeState::Active
    }

    /// Move the node into the `Invalidated` state.
    pub fn invalidate(&mut self) {
        self.state = NodeState::Invalidated;
    }

    pub fn body(&self) -> Rc<dyn NodeBody> {
        Rc::clone(&self.body)
    }

    pub fn invalidation(&self) -> Rc<RefCell<Box<dyn InvalidationStrategy>>> {
        Rc::clone(&self.invalidation)
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Whether the node is part of a sweep that has not reached it yet.
    pub fn is_pending(&self) -> bool {
        self.dirty != DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (an upstream node is being swept).
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (a direct dependency propagated).
    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Record what the latest evaluation read.
    ///
    /// Frozen values the evaluation no longer read are dropped.
    pub fn observe(&mut self, reads: &IndexSet<NodeId>, values: HashMap<NodeId, Rc<dyn Any>>) {
        self.observed = values;
        self.frozen.retain(|closed, _| reads.contains(closed));
    }

    /// Value `dependency` served to this node's latest evaluation.
    pub fn observed_value(&self, dependency: NodeId) -> Option<Rc<dyn Any>> {
        self.observed.get(&dependency).cloned()
    }

    /// Keep the last value of a closed dependency.
    pub fn freeze(&mut self, closed: NodeId, value: Rc<dyn Any>) {
        self.observed.remove(&closed);
        self.frozen.insert(closed, value);
    }

    pub fn frozen_value(&self, closed: NodeId) -> Option<Rc<dyn Any>> {
        self.frozen.get(&closed).cloned()
    }

    pub fn frozen_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frozen.keys().copied()
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn fields(&self) -> &[NodeId] {
        &self.fields
    }

    pub fn add_field(&mut self, field: NodeId) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    pub fn remove_field(&mut self, field: NodeId) {
        self.fields.retain(|f| *f != field);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .field("value_type", &self.body.value_type())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}
