//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects vars, calcs, fields
//! and actions. It owns no state of its own: everything lives in the
//! thread's registry, and the runtime sequences registry updates around the
//! user code they trigger.
//!
//! # How It Works
//!
//! 1. Creating a computation runs its routine once inside a tracking scope.
//!    Every node read becomes a dependency edge.
//!
//! 2. When a source is written, its trigger policy decides whether the change
//!    propagates. If it does, the registry marks the affected region and
//!    returns it in dependency order.
//!
//! 3. Each node in the region is settled: its pending dependencies settle
//!    first, then it re-evaluates if one of them propagated. Its own policy
//!    then decides whether its dependents are notified.
//!
//! 4. Reading a node that is still pending settles it on the spot, so a
//!    routine never observes a stale upstream value.
//!
//! If a routine or policy panics, the panic reaches the caller. Nodes the
//! interrupted sweep did not reach are settled by the next one.
//!
//! # Borrowing
//!
//! The registry is never borrowed while a routine, policy or strategy runs.
//! Bodies and strategies are cloned out (`Rc`) first.

use std::any::{type_name, Any};
use std::rc::Rc;
use std::thread;

use smallvec::SmallVec;
use tracing::{debug, debug_span, trace, warn};

use crate::error::{ReactionError, Result};
use crate::graph::{
    with_registry, Evaluation, GraphSnapshot, Node, NodeBody, NodeId, NodeKind, NodeState,
};

use super::body::{Routine, ValueCell};
use super::context::ReactiveContext;
use super::invalidation::{InvalidationAction, InvalidationEvent};
use super::options::NodeOptions;

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a source (or field) node holding `value`.
    pub(crate) fn create_source<T>(
        id: NodeId,
        kind: NodeKind,
        value: T,
        options: NodeOptions,
        owner: Option<NodeId>,
        fields: SmallVec<[NodeId; 4]>,
    ) -> NodeId
    where
        T: Clone + PartialEq + 'static,
    {
        let parts = options.into_parts(kind);
        let body = ValueCell::new(value, None, parts.trigger, parts.threshold);
        let node = Node::new(id, kind, Rc::new(body), parts.invalidation)
            .with_name(parts.name)
            .with_owner(owner)
            .with_fields(fields);

        with_registry(|registry| registry.insert(node));
        trace!(node = %id, ?kind, value_type = type_name::<T>(), "created node");
        id
    }

    /// Register a computation (or effect) node and run its first evaluation.
    pub(crate) fn create_computation<T>(
        kind: NodeKind,
        mut routine: Routine<T>,
        options: NodeOptions,
    ) -> NodeId
    where
        T: Clone + PartialEq + 'static,
    {
        let id = NodeId::new();
        let parts = options.into_parts(kind);
        let (value, reads) = ReactiveContext::track(id, &mut routine);
        let dependencies = reads.nodes.len();

        let body = ValueCell::new(value, Some(routine), parts.trigger, parts.threshold);
        let node = Node::new(id, kind, Rc::new(body), parts.invalidation).with_name(parts.name);

        with_registry(|registry| {
            registry.insert(node);
            registry.replace_dependencies(id, reads);
        });
        trace!(
            node = %id,
            ?kind,
            value_type = type_name::<T>(),
            dependencies,
            "created node"
        );
        id
    }

    /// Read a node's value, settling it first if a sweep has not reached it.
    ///
    /// A tracked read inside an evaluation records a dependency edge, along
    /// with the value it served.
    pub(crate) fn read<T>(id: NodeId, tracked: bool) -> Result<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Self::settle(id);

        let Some(body) = with_registry(|registry| registry.active_body(id)) else {
            return Self::read_frozen(id, tracked);
        };
        let value = Self::cell::<T>(id, body.as_ref())?.get();
        if tracked {
            ReactiveContext::track_read(id, || Rc::new(value.clone()));
        }
        Ok(value)
    }

    /// Value kept for the running node after `id` was closed under `LastVal`.
    ///
    /// A tracked read keeps the frozen value for the next evaluation.
    fn read_frozen<T>(id: NodeId, tracked: bool) -> Result<T>
    where
        T: Clone + 'static,
    {
        let frozen = ReactiveContext::current_subscriber().and_then(|subscriber| {
            with_registry(|registry| {
                registry
                    .get(subscriber)
                    .and_then(|node| node.frozen_value(id))
            })
        });

        let Some(frozen) = frozen else {
            return Err(ReactionError::Closed(id));
        };
        if tracked {
            ReactiveContext::track_dependency(id);
        }
        trace!(node = %id, "serving frozen value");
        frozen
            .downcast_ref::<T>()
            .cloned()
            .ok_or(ReactionError::TypeMismatch {
                node: id,
                expected: type_name::<T>(),
            })
    }

    /// Assign a source or field and propagate per its trigger policy.
    ///
    /// A field that propagates also marks its owner as changed.
    pub(crate) fn write<T>(id: NodeId, value: T) -> Result<()>
    where
        T: Clone + PartialEq + 'static,
    {
        let body = with_registry(|registry| registry.active_body(id))
            .ok_or(ReactionError::Closed(id))?;
        let propagate = Self::cell::<T>(id, body.as_ref())?.assign(id, value);
        debug!(node = %id, propagate, "write");

        if !propagate {
            return Ok(());
        }

        let mut roots: SmallVec<[NodeId; 2]> = SmallVec::new();
        roots.push(id);
        if let Some((owner, owner_body)) = Self::owner_of(id) {
            if owner_body.touch(owner) {
                roots.push(owner);
            }
        }
        Self::propagate(&roots);
        Ok(())
    }

    /// Var that a field is bound to, if both are live.
    pub(crate) fn owner(id: NodeId) -> Option<NodeId> {
        with_registry(|registry| {
            let owner = registry.get(id)?.owner()?;
            registry.get(owner).map(Node::id)
        })
    }

    fn owner_of(id: NodeId) -> Option<(NodeId, Rc<dyn NodeBody>)> {
        with_registry(|registry| {
            let owner = registry.get(id)?.owner()?;
            Some((owner, registry.active_body(owner)?))
        })
    }

    /// Run one sweep from nodes whose change was accepted by their policy.
    ///
    /// Nodes left pending by an interrupted sweep are settled first.
    pub(crate) fn propagate(roots: &[NodeId]) {
        let order = with_registry(|registry| {
            let mut order = registry.begin_sweep();
            order.extend(registry.mark_changed(roots));
            order
        });
        let sweep = Sweep { order };
        if sweep.order.is_empty() {
            return;
        }

        let _span = debug_span!("propagate", ?roots, affected = sweep.order.len()).entered();
        for &id in &sweep.order {
            Self::settle(id);
        }
    }

    /// Bring a pending node up to date: settle its pending dependencies,
    /// then re-evaluate if one of them propagated.
    fn settle(id: NodeId) {
        let Some(pending) = with_registry(|registry| registry.pending_dependencies(id)) else {
            return;
        };
        for dependency in pending {
            Self::settle(dependency);
        }
        if with_registry(|registry| registry.take_dirty(id)) {
            Self::evaluate(id);
        }
    }

    /// Re-run a computation's routine, refresh its edges and notify its
    /// dependents if its policy says so.
    pub(crate) fn evaluate(id: NodeId) {
        let body = with_registry(|registry| {
            registry
                .get(id)
                .filter(|node| node.is_active() && node.kind().is_computation())
                .map(Node::body)
        });
        let Some(body) = body else {
            return;
        };

        let _span = debug_span!("evaluate", node = %id).entered();
        let Some(evaluation) = body.recompute(id) else {
            warn!(node = %id, "skipping re-entrant evaluation");
            return;
        };

        let Evaluation { reads, propagate } = evaluation;

        // The routine may have closed its own node.
        let outside_sweep = with_registry(|registry| {
            if registry.state(id) != NodeState::Active {
                return false;
            }
            registry.replace_dependencies(id, reads);
            propagate && registry.mark_dependents_dirty(id)
        });
        debug!(propagate, "evaluated");

        if outside_sweep {
            Self::propagate(&[id]);
        }
    }

    /// Replace a computation's routine.
    ///
    /// The new routine is run once against the live graph before anything is
    /// committed. If it reads the node itself, directly or through another
    /// node, the reset is refused and the old routine and edges stay.
    pub(crate) fn reset<T>(id: NodeId, mut routine: Routine<T>) -> Result<()>
    where
        T: Clone + PartialEq + 'static,
    {
        let body = with_registry(|registry| {
            let node = registry.get(id).filter(|node| node.is_active())?;
            Some((node.kind(), node.body()))
        });
        let Some((kind, body)) = body else {
            return Err(ReactionError::Closed(id));
        };
        if !kind.is_computation() {
            return Err(ReactionError::NotComputation(id));
        }
        let cell = Self::cell::<T>(id, body.as_ref())?;

        let _span = debug_span!("reset", node = %id).entered();
        let (value, reads) = ReactiveContext::track(id, &mut routine);

        if let Some(via) = with_registry(|registry| registry.find_cycle(id, &reads.nodes)) {
            debug!(%via, "reset refused, routine would depend on its own node");
            return Err(ReactionError::CycleDependency { node: id, via });
        }

        cell.install(routine);
        let propagate = cell.assign(id, value);
        let dependencies = reads.nodes.len();
        with_registry(|registry| registry.replace_dependencies(id, reads));
        debug!(dependencies, propagate, "reset committed");

        if propagate {
            Self::propagate(&[id]);
        }
        Ok(())
    }

    /// Install a predicate on a node created with a `Threshold` trigger.
    pub(crate) fn configure_threshold<F>(id: NodeId, predicate: F) -> Result<()>
    where
        F: FnMut() -> bool + 'static,
    {
        let threshold = with_registry(|registry| {
            registry
                .get(id)
                .filter(|node| node.is_active())
                .map(|node| node.body().threshold())
        })
        .ok_or(ReactionError::Closed(id))?
        .ok_or(ReactionError::NotThreshold(id))?;

        threshold.configure(predicate);
        debug!(node = %id, "threshold configured");
        Ok(())
    }

    /// Close a node.
    ///
    /// Every dependent is asked through its invalidation strategy how to
    /// react before the node and its edges are removed. Fields of a source's
    /// aggregate are closed with it. Closing a closed node does nothing.
    pub fn close(id: NodeId) {
        let Some(plan) = with_registry(|registry| registry.begin_close(id)) else {
            return;
        };

        let _span = debug_span!("close", node = %id).entered();
        for field in plan.fields {
            Self::close(field);
        }
        for dependent in plan.dependents {
            Self::invalidate(dependent, id);
        }

        let removed = with_registry(|registry| registry.remove(id));
        debug!("closed");
        drop(removed);
    }

    fn invalidate(node: NodeId, closed: NodeId) {
        let strategy = with_registry(|registry| {
            registry
                .get(node)
                .filter(|node| node.is_active())
                .map(Node::invalidation)
        });
        let Some(strategy) = strategy else {
            return;
        };

        let event = InvalidationEvent::new(node, closed);
        let action = match strategy.try_borrow_mut() {
            Ok(mut strategy) => strategy.handle_invalidation(&event),
            Err(_) => {
                warn!(%node, "invalidation strategy re-entered, closing");
                InvalidationAction::Close
            }
        };
        debug!(%node, %closed, ?action, "dependency closed");

        match action {
            InvalidationAction::Close => Self::close(node),
            InvalidationAction::Keep => {
                with_registry(|registry| registry.remove_edge(closed, node));
            }
            InvalidationAction::Freeze => {
                let last = Self::last_observed(node, closed);
                with_registry(|registry| {
                    if let (Some(last), Some(dependent)) = (last, registry.get_mut(node)) {
                        dependent.freeze(closed, last);
                    }
                    registry.remove_edge(closed, node);
                });
            }
        }
    }

    /// Value `closed` last served to `node`, or its current value if `node`
    /// never recorded one.
    fn last_observed(node: NodeId, closed: NodeId) -> Option<Rc<dyn Any>> {
        let (observed, body) = with_registry(|registry| {
            let observed = registry.get(node).and_then(|node| node.observed_value(closed));
            (observed, registry.get(closed).map(Node::body))
        });
        observed.or_else(|| body.map(|body| body.snapshot()))
    }

    /// Whether `id` refers to a live node on this thread.
    pub fn is_valid(id: NodeId) -> bool {
        Self::state(id) == NodeState::Active
    }

    pub fn state(id: NodeId) -> NodeState {
        with_registry(|registry| registry.state(id))
    }

    /// Number of live nodes on this thread.
    pub fn node_count() -> usize {
        with_registry(|registry| registry.len())
    }

    /// Serializable copy of this thread's graph.
    pub fn snapshot() -> GraphSnapshot {
        with_registry(|registry| registry.snapshot())
    }

    /// Drop every node on this thread. Existing handles become invalid.
    pub fn teardown() {
        let nodes = with_registry(|registry| registry.drain());
        debug!(count = nodes.len(), "registry torn down");
        drop(nodes);
    }

    fn cell<T>(id: NodeId, body: &dyn NodeBody) -> Result<&ValueCell<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        body.as_any()
            .downcast_ref::<ValueCell<T>>()
            .ok_or(ReactionError::TypeMismatch {
                node: id,
                expected: type_name::<T>(),
            })
    }
}

/// A running sweep. Dropped during a panic, it keeps the nodes it did not
/// settle for the next sweep.
struct Sweep {
    order: Vec<NodeId>,
}

impl Drop for Sweep {
    fn drop(&mut self) {
        let interrupted = thread::panicking();
        with_registry(|registry| registry.end_sweep(&self.order, interrupted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Action, Calc, Reactive, Var};
    use std::cell::Cell;

    #[test]
    fn read_records_dependency_only_when_tracked() {
        let a = Var::new(1);
        let b = Var::new(2);
        let sum = Calc::new(move || a.get() + b.get_untracked());

        let snapshot = Runtime::snapshot();
        let node = snapshot.node(sum.node_id()).unwrap();
        assert_eq!(node.dependencies, vec![a.node_id()]);

        b.set(10);
        assert_eq!(sum.get(), 3);
        a.set(2);
        assert_eq!(sum.get(), 12);
    }

    #[test]
    fn diamond_evaluates_each_node_once() {
        let runs = Rc::new(Cell::new(0));
        let a = Var::new(1);
        let left = Calc::new(move || a.get() + 1);
        let right = Calc::new(move || a.get() * 2);
        let counter = Rc::clone(&runs);
        let bottom = Calc::new(move || {
            counter.set(counter.get() + 1);
            left.get() + right.get()
        });
        assert_eq!(runs.get(), 1);

        a.set(5);
        assert_eq!(bottom.get(), 16);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unchanged_intermediate_stops_propagation() {
        let runs = Rc::new(Cell::new(0));
        let a = Var::new(2);
        let parity = Calc::new(move || a.get() % 2);
        let counter = Rc::clone(&runs);
        let _watch = Action::new(move || {
            parity.get();
            counter.set(counter.get() + 1);
        });

        a.set(4);
        assert_eq!(runs.get(), 1);
        a.set(5);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn write_inside_evaluation_starts_nested_sweep() {
        let source = Var::new(0);
        let mirror = Var::new(0);
        let _copy = Action::new(move || mirror.set(source.get()));
        let doubled = Calc::new(move || mirror.get() * 2);

        source.set(21);
        assert_eq!(mirror.get(), 21);
        assert_eq!(doubled.get(), 42);
    }

    #[test]
    fn close_is_idempotent_and_removes_edges() {
        let before = Runtime::node_count();
        let a = Var::new(1);
        let b = Calc::new(move || a.get());
        assert_eq!(Runtime::node_count(), before + 2);

        Runtime::close(a.node_id());
        Runtime::close(a.node_id());

        assert!(!Runtime::is_valid(a.node_id()));
        assert!(!Runtime::is_valid(b.node_id()));
        assert_eq!(Runtime::state(b.node_id()), NodeState::Closed);
        assert_eq!(Runtime::node_count(), before);
        assert!(Runtime::snapshot().is_consistent());
    }

    #[test]
    fn reading_a_closed_node_fails() {
        let a = Var::new(1);
        a.close();
        assert_eq!(Runtime::read::<i32>(a.node_id(), true), Err(ReactionError::Closed(a.node_id())));
        assert_eq!(
            Runtime::write(a.node_id(), 2),
            Err(ReactionError::Closed(a.node_id()))
        );
    }

    #[test]
    fn mismatched_type_is_reported() {
        let a = Var::new(1_i32);
        let err = Runtime::read::<String>(a.node_id(), false).unwrap_err();
        assert!(matches!(err, ReactionError::TypeMismatch { .. }));
    }

    #[test]
    fn teardown_drops_everything() {
        let a = Var::new(1);
        let _b = Calc::new(move || a.get());

        Runtime::teardown();
        assert_eq!(Runtime::node_count(), 0);
        assert!(!a.is_valid());
    }
}
