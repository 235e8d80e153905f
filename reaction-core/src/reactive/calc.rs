//! Calc Implementation
//!
//! A Calc is a computation node: a value derived from other nodes by a
//! routine. The routine runs once when the calc is created and again every
//! time a dependency it read propagates a change.
//!
//! Dependencies are whatever the routine read on its latest run, so a calc
//! with a branch only depends on the side it took.

use std::any::{type_name, Any};
use std::marker::PhantomData;

use crate::error::{ReactionError, Result};
use crate::graph::{NodeId, NodeKind};

use super::body::Routine;
use super::handle::impl_handle;
use super::options::NodeOptions;
use super::runtime::Runtime;

/// A derived reactive value.
///
/// # Example
///
/// ```
/// use reaction_core::prelude::*;
///
/// let a = var(1);
/// let label = calc(move || a.get().to_string());
///
/// let b = var(String::from("2"));
/// label.reset(move || b.get() + "set").unwrap();
/// assert_eq!(label.get(), "2set");
///
/// // The result type is fixed at creation.
/// assert!(label.reset(move || a.get()).is_err());
/// ```
pub struct Calc<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl_handle!(Calc);

impl<T> Calc<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new<F>(routine: F) -> Self
    where
        F: FnMut() -> T + 'static,
    {
        Self::with_options(routine, NodeOptions::default())
    }

    pub fn with_options<F>(routine: F, options: NodeOptions) -> Self
    where
        F: FnMut() -> T + 'static,
    {
        let id =
            Runtime::create_computation::<T>(NodeKind::Computation, Box::new(routine), options);
        Self::from_id(id)
    }

    /// Replace the routine, keeping the node's identity and dependents.
    ///
    /// # Errors
    ///
    /// - [`ReactionError::ReturnType`] if `routine` does not return `T`.
    /// - [`ReactionError::CycleDependency`] if `routine` reads this calc,
    ///   directly or through another node.
    /// - [`ReactionError::Closed`] if the calc has been closed.
    ///
    /// On error the previous routine, value and dependencies are kept.
    pub fn reset<R, F>(&self, routine: F) -> Result<()>
    where
        R: 'static,
        F: FnMut() -> R + 'static,
    {
        let routine = typed_routine::<T, R, F>(self.id, routine)?;
        Runtime::reset(self.id, routine)
    }
}

/// Box `routine` as a routine returning `T`, or report what it returns
/// instead.
pub(crate) fn typed_routine<T, R, F>(node: NodeId, routine: F) -> Result<Routine<T>>
where
    T: 'static,
    R: 'static,
    F: FnMut() -> R + 'static,
{
    let boxed: Box<dyn Any> = Box::new(Box::new(routine) as Routine<R>);
    boxed
        .downcast::<Routine<T>>()
        .map(|routine| *routine)
        .map_err(|_| ReactionError::ReturnType {
            node,
            expected: type_name::<T>(),
            found: type_name::<R>(),
        })
}

/// Create a [`Calc`] from `routine`.
pub fn calc<T, F>(routine: F) -> Calc<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> T + 'static,
{
    Calc::new(routine)
}
