//! Fields
//!
//! A field is a reactive member of an aggregate value held by a var. It is a
//! node of its own, so calcs can depend on a single member, and it is bound
//! to its owning var, so writing the member also counts as a change of the
//! whole aggregate.
//!
//! ```
//! use reaction_core::prelude::*;
//!
//! #[derive(Clone, PartialEq)]
//! struct Person {
//!     name: Field<String>,
//!     age: Field<u32>,
//! }
//!
//! let person = Var::aggregate(|owner| Person {
//!     name: owner.field(String::from("Ada")),
//!     age: owner.field(36),
//! });
//! let greeting = calc(move || format!("{} ({})", person.get().name.get(), person.get().age.get()));
//!
//! person.get_untracked().age.set(37);
//! assert_eq!(greeting.get(), "Ada (37)");
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;

use smallvec::SmallVec;
use tracing::warn;

use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

use super::handle::{impl_handle, Reactive};
use super::options::NodeOptions;
use super::runtime::Runtime;
use super::var::Var;

/// Collects the fields created while building an aggregate.
///
/// Handed out by [`Var::aggregate`]; the var it stands for is registered once
/// the builder returns.
pub struct FieldOwner {
    id: NodeId,
    fields: RefCell<SmallVec<[NodeId; 4]>>,
}

impl FieldOwner {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            fields: RefCell::new(SmallVec::new()),
        }
    }

    /// ID the owning var will have.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn field<V>(&self, value: V) -> Field<V>
    where
        V: Clone + PartialEq + 'static,
    {
        self.field_with(value, NodeOptions::default())
    }

    pub fn field_with<V>(&self, value: V, options: NodeOptions) -> Field<V>
    where
        V: Clone + PartialEq + 'static,
    {
        let field = Field::create(self.id, value, options);
        self.fields.borrow_mut().push(field.id);
        field
    }

    pub(crate) fn into_parts(self) -> (NodeId, SmallVec<[NodeId; 4]>) {
        (self.id, self.fields.into_inner())
    }
}

/// A reactive member of an aggregate held by a [`Var`].
///
/// Aggregates store the handle, so two aggregates compare equal when they
/// hold the same fields, whatever the fields' current values.
pub struct Field<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl_handle!(Field);

impl<T> Field<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Bind a new field to an existing var.
    pub fn new<A>(owner: &Var<A>, value: T) -> Self
    where
        A: Clone + PartialEq + 'static,
    {
        Self::with_options(owner, value, NodeOptions::default())
    }

    pub fn with_options<A>(owner: &Var<A>, value: T, options: NodeOptions) -> Self
    where
        A: Clone + PartialEq + 'static,
    {
        Self::create(owner.node_id(), value, options)
    }

    fn create(owner: NodeId, value: T, options: NodeOptions) -> Self {
        let id = Runtime::create_source(
            NodeId::new(),
            NodeKind::Field,
            value,
            options,
            Some(owner),
            SmallVec::new(),
        );
        Self::from_id(id)
    }

    /// Assign the member. If the field's policy propagates, the owning var
    /// is marked changed too. Writing a closed field is logged and ignored.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(%err, "write ignored");
        }
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        Runtime::write(self.id, value)
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        match self.try_get_untracked() {
            Ok(current) => self.set(f(&current)),
            Err(err) => warn!(%err, "update ignored"),
        }
    }

    /// The var this field is bound to, while both are live.
    pub fn owner(&self) -> Option<NodeId> {
        Runtime::owner(self.id)
    }
}
