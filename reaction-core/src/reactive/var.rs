//! Var Implementation
//!
//! A Var is a source node: it holds a value assigned by the caller and has
//! no dependencies of its own.
//!
//! # How Vars Work
//!
//! 1. Reading a var inside a calc or action records a dependency edge.
//!
//! 2. Writing a var hands the old and new values to its trigger policy.
//!
//! 3. If the policy accepts the change, every node downstream is settled in
//!    dependency order before `set` returns.

use std::marker::PhantomData;

use smallvec::SmallVec;
use tracing::warn;

use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

use super::field::FieldOwner;
use super::handle::{impl_handle, Reactive};
use super::options::NodeOptions;
use super::runtime::Runtime;

/// A reactive source holding a value of type `T`.
///
/// # Example
///
/// ```
/// use reaction_core::prelude::*;
///
/// let count = var(0);
/// let doubled = calc(move || count.get() * 2);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Var<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl_handle!(Var);

impl<T> Var<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new(value: T) -> Self {
        Self::with_options(value, NodeOptions::default())
    }

    pub fn with_options(value: T, options: NodeOptions) -> Self {
        let id = Runtime::create_source(
            NodeId::new(),
            NodeKind::Source,
            value,
            options,
            None,
            SmallVec::new(),
        );
        Self::from_id(id)
    }

    /// Create a var whose value embeds reactive fields.
    ///
    /// Fields created through the [`FieldOwner`] are bound to the new var:
    /// writing one notifies the field's own dependents and the var's.
    pub fn aggregate<F>(build: F) -> Self
    where
        F: FnOnce(&FieldOwner) -> T,
    {
        Self::aggregate_with_options(build, NodeOptions::default())
    }

    pub fn aggregate_with_options<F>(build: F, options: NodeOptions) -> Self
    where
        F: FnOnce(&FieldOwner) -> T,
    {
        let owner = FieldOwner::new(NodeId::new());
        let value = build(&owner);
        let (id, fields) = owner.into_parts();

        let id = Runtime::create_source(id, NodeKind::Source, value, options, None, fields);
        Self::from_id(id)
    }

    /// Assign a new value. Writing a closed var is logged and ignored.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(%err, "write ignored");
        }
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        Runtime::write(self.id, value)
    }

    /// Replace the value with `f(current)`. The current value is read
    /// untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        match self.try_get_untracked() {
            Ok(current) => self.set(f(&current)),
            Err(err) => warn!(%err, "update ignored"),
        }
    }
}

/// Create a [`Var`] holding `value`.
pub fn var<T>(value: T) -> Var<T>
where
    T: Clone + PartialEq + 'static,
{
    Var::new(value)
}
