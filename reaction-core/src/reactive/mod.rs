//! Reactive Primitives
//!
//! This module implements the reactive system on top of the dependency graph:
//! vars, calcs, actions and fields, plus the policies that decide how changes
//! and closures travel through the graph.
//!
//! # Concepts
//!
//! ## Vars
//!
//! A Var is a container for mutable state. When a var's value is read within
//! a tracking context (a calc or action), the var is recorded as a dependency
//! of that context. When the var is written, its dependents are re-evaluated.
//!
//! ## Calcs
//!
//! A Calc is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies propagates a change. Its routine can be
//! replaced later with `reset`, as long as the result type stays the same and
//! no cycle is introduced.
//!
//! ## Actions
//!
//! An Action is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! ## Fields
//!
//! A Field is a reactive member of an aggregate held by a var. Writing it
//! notifies the field's own dependents and the var's.
//!
//! ## Policies
//!
//! Each node carries a [`TriggerPolicy`] deciding whether its changes
//! propagate, and an [`InvalidationStrategy`] deciding what happens to it when
//! one of its dependencies is closed. Both are chosen through [`NodeOptions`].
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a handle is read, we check if there is an active
//! tracking context and, if so, record the dependency.

mod action;
pub(crate) mod body;
mod calc;
mod context;
mod expr;
mod field;
mod handle;
mod invalidation;
mod options;
mod runtime;
mod trigger;
mod var;

pub use action::{action, Action};
pub use calc::{calc, Calc};
pub use context::{untrack, ReactiveContext};
pub use field::{Field, FieldOwner};
pub use handle::Reactive;
pub use invalidation::{
    DirectClose, InvalidationAction, InvalidationEvent, InvalidationStrategy, KeepCalc, LastVal,
};
pub use options::NodeOptions;
pub use runtime::Runtime;
pub use trigger::{Always, Change, Changed, Threshold, TriggerPolicy};
pub use var::{var, Var};
