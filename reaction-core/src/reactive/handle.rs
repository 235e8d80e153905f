//! Handles
//!
//! Every handle is a typed `NodeId`. Handles are `Copy`: copies alias the
//! same node, and dropping a handle never closes anything. A node goes away
//! only through an explicit `close` (or `Runtime::teardown`).

use crate::error::Result;
use crate::graph::NodeId;

use super::runtime::Runtime;

/// Operations shared by every readable handle.
pub trait Reactive {
    type Value: Clone + PartialEq + 'static;

    fn node_id(&self) -> NodeId;

    /// Read the value, recording a dependency if an evaluation is running.
    fn try_get(&self) -> Result<Self::Value> {
        Runtime::read(self.node_id(), true)
    }

    /// Read the value, recording a dependency if an evaluation is running.
    ///
    /// # Panics
    ///
    /// Panics if the node has been closed. Use [`Reactive::try_get`] where
    /// that can happen, for instance in a routine guarded by `KeepCalc`.
    #[track_caller]
    fn get(&self) -> Self::Value {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Read the value without recording a dependency.
    fn try_get_untracked(&self) -> Result<Self::Value> {
        Runtime::read(self.node_id(), false)
    }

    #[track_caller]
    fn get_untracked(&self) -> Self::Value {
        self.try_get_untracked().unwrap_or_else(|err| panic!("{err}"))
    }

    fn is_valid(&self) -> bool {
        Runtime::is_valid(self.node_id())
    }

    /// Close the node, running the invalidation cascade on its dependents.
    fn close(&self) {
        Runtime::close(self.node_id())
    }

    /// Install the predicate of a node created with a `Threshold` trigger.
    fn configure_threshold<F>(&self, predicate: F) -> Result<()>
    where
        F: FnMut() -> bool + 'static,
    {
        Runtime::configure_threshold(self.node_id(), predicate)
    }
}

/// Identity-based trait impls for a typed handle, with no bounds on `T`.
macro_rules! impl_handle {
    ($name:ident) => {
        impl<T> $name<T> {
            pub(crate) fn from_id(id: $crate::graph::NodeId) -> Self {
                Self {
                    id,
                    _marker: ::std::marker::PhantomData,
                }
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> ::std::hash::Hash for $name<T> {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&self.id, state);
            }
        }

        impl<T> ::std::fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.id)
                    .field("type", &::std::any::type_name::<T>())
                    .finish()
            }
        }

        impl<T> $crate::reactive::Reactive for $name<T>
        where
            T: Clone + PartialEq + 'static,
        {
            type Value = T;

            fn node_id(&self) -> $crate::graph::NodeId {
                self.id
            }
        }
    };
}

pub(crate) use impl_handle;
