//! Reaction Core
//!
//! This crate provides the dependency-tracking engine of the Reaction
//! reactive runtime. It implements:
//!
//! - Reactive primitives (vars, calcs, actions, fields)
//! - Automatic dependency capture during evaluation
//! - Ordered, glitch-free update propagation
//! - Pluggable trigger policies and invalidation strategies
//! - Type-checked, cycle-checked routine replacement (`reset`)
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: the registry that owns every node and edge, and the
//!   topological ordering of propagation sweeps
//! - `reactive`: handles, tracking context, policies and the runtime that
//!   drives evaluation
//! - `error`: the errors reported by fallible operations
//!
//! The registry is per thread. Everything runs synchronously on the calling
//! thread: a write returns once every affected node has settled.
//!
//! # Example
//!
//! ```rust
//! use reaction_core::prelude::*;
//!
//! let buy_price = var(100);
//! let current_price = var(105);
//! let profit = calc(move || current_price.get() - buy_price.get());
//! assert_eq!(profit.get(), 5);
//!
//! current_price.set(110);
//! assert_eq!(profit.get(), 10);
//!
//! current_price.set(95);
//! assert_eq!(profit.get(), -5);
//!
//! buy_price.set(90);
//! assert_eq!(profit.get(), 5);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactionError, Result};
pub use graph::{GraphSnapshot, NodeId, NodeKind, NodeState, NodeSnapshot};
pub use reactive::{
    action, calc, untrack, var, Action, Always, Calc, Change, Changed, DirectClose, Field,
    FieldOwner, InvalidationAction, InvalidationEvent, InvalidationStrategy, KeepCalc, LastVal,
    NodeOptions, Reactive, Runtime, Threshold, TriggerPolicy, Var,
};

/// Everything needed to build and wire reactive nodes.
pub mod prelude {
    pub use crate::error::ReactionError;
    pub use crate::graph::NodeId;
    pub use crate::reactive::{
        action, calc, untrack, var, Action, Always, Calc, Changed, DirectClose, Field,
        FieldOwner, KeepCalc, LastVal, NodeOptions, Reactive, Runtime, Threshold, Var,
    };
}
