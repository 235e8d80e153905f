//! Error types for the reactive engine.
//!
//! Only two classes of failure are reported through `Result`:
//!
//! - **Configuration errors** raised by `reset` (result type mismatch, cyclic
//!   dependency). These are detected before anything is mutated, so the node
//!   keeps its previous routine, value and edges.
//! - **Lifecycle errors** raised when a handle no longer resolves to a live
//!   node. The graph is never touched in that case.
//!
//! Panics raised by user routines or custom policies are not caught.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors reported by the reactive engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactionError {
    /// The node has been closed, or was never registered on this thread.
    #[error("reactive node {0} is closed")]
    Closed(NodeId),

    /// `reset` was given a routine whose result type differs from the node's.
    #[error("cannot reset node {node}: routine returns `{found}` but the node holds `{expected}`")]
    ReturnType {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    /// `reset` was given a routine that would make the node depend on itself.
    #[error("cannot reset node {node}: reading node {via} would create a dependency cycle")]
    CycleDependency { node: NodeId, via: NodeId },

    /// A handle resolved to a node storing a different value type.
    #[error("reactive node {node} does not hold a value of type `{expected}`")]
    TypeMismatch { node: NodeId, expected: &'static str },

    /// The node was not created with a `Threshold` trigger policy.
    #[error("reactive node {0} has no threshold trigger to configure")]
    NotThreshold(NodeId),

    /// The operation needs a computation node (one with an evaluation routine).
    #[error("reactive node {0} is not a computation")]
    NotComputation(NodeId),
}

impl ReactionError {
    /// Whether this error was produced by a rejected reconfiguration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ReturnType { .. } | Self::CycleDependency { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactionError>;
