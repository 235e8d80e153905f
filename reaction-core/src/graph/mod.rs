//! Dependency Graph
//!
//! This module implements the registry that owns every reactive node and the
//! edges between them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent sources, computations, effects and fields
//! - Edges represent dependencies: if A reads B, A depends on B
//!
//! # Design Decisions
//!
//! 1. Nodes are stored in a central arena keyed by `NodeId`. Edges are pairs
//!    of IDs, never owning pointers, so closing a node can't leave another
//!    one dangling and there is no ownership cycle to break.
//!
//! 2. The arena is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions. Every mutation goes
//!    through the registry, which updates both sides together.
//!
//! 4. Cycles are rejected when a routine is replaced (`reset`). Evaluation at
//!    creation can't produce one, since a node doesn't exist before its
//!    first evaluation finishes.

mod node;
mod registry;
mod snapshot;

pub use node::{NodeId, NodeKind, NodeState};
pub use snapshot::{GraphSnapshot, NodeSnapshot};

pub(crate) use node::{Evaluation, Node, NodeBody, Reads};
pub(crate) use registry::with_registry;
