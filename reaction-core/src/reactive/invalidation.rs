//! Invalidation Strategies
//!
//! When a node is closed, each of its dependents is asked how to react. The
//! answer comes from the dependent's own strategy:
//!
//! - [`DirectClose`] closes the dependent too, cascading further.
//! - [`KeepCalc`] keeps the dependent alive; later reads of the closed node
//!   simply fail.
//! - [`LastVal`] keeps the dependent alive and freezes the closed node's last
//!   value for the dependent's own evaluations.

use crate::graph::NodeId;

/// A dependency of `node` has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationEvent {
    node: NodeId,
    closed: NodeId,
}

impl InvalidationEvent {
    pub(crate) fn new(node: NodeId, closed: NodeId) -> Self {
        Self { node, closed }
    }

    /// The node being asked to react.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The dependency that went away.
    pub fn closed(&self) -> NodeId {
        self.closed
    }
}

/// What the registry should do with a node whose dependency was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationAction {
    /// Close the node, cascading to its own dependents.
    Close,
    /// Keep the node. Its edge to the closed dependency is removed.
    Keep,
    /// Keep the node and remember the dependency's last value.
    Freeze,
}

/// Decides how a node responds to one of its dependencies being closed.
pub trait InvalidationStrategy {
    fn handle_invalidation(&mut self, event: &InvalidationEvent) -> InvalidationAction;
}

impl<F> InvalidationStrategy for F
where
    F: FnMut(&InvalidationEvent) -> InvalidationAction,
{
    fn handle_invalidation(&mut self, event: &InvalidationEvent) -> InvalidationAction {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectClose;

impl InvalidationStrategy for DirectClose {
    fn handle_invalidation(&mut self, _event: &InvalidationEvent) -> InvalidationAction {
        InvalidationAction::Close
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepCalc;

impl InvalidationStrategy for KeepCalc {
    fn handle_invalidation(&mut self, _event: &InvalidationEvent) -> InvalidationAction {
        InvalidationAction::Keep
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LastVal;

impl InvalidationStrategy for LastVal {
    fn handle_invalidation(&mut self, _event: &InvalidationEvent) -> InvalidationAction {
        InvalidationAction::Freeze
    }
}
