//! Action Implementation
//!
//! An Action is a side-effecting computation that runs whenever its
//! dependencies change. Actions are used to synchronize reactive state with
//! the outside world, such as logging or writing to another system.
//!
//! Actions default to the `Always` trigger: they hold no meaningful value,
//! so every upstream evaluation that reaches them runs them again.

use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

use super::calc::typed_routine;
use super::handle::Reactive;
use super::options::NodeOptions;
use super::runtime::Runtime;

/// An effect node.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use reaction_core::prelude::*;
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let count = var(0);
///
/// let sink = Rc::clone(&log);
/// let _logger = action(move || sink.borrow_mut().push(count.get()));
///
/// count.set(1);
/// count.set(2);
/// assert_eq!(*log.borrow(), vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    id: NodeId,
}

impl Action {
    /// Create an action. The routine runs immediately.
    pub fn new<F>(routine: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::with_options(routine, NodeOptions::default())
    }

    pub fn with_options<F>(routine: F, options: NodeOptions) -> Self
    where
        F: FnMut() + 'static,
    {
        let id =
            Runtime::create_computation::<()>(NodeKind::Effect, Box::new(routine), options);
        Self { id }
    }

    /// Replace the routine. See [`Calc::reset`](super::Calc::reset).
    pub fn reset<R, F>(&self, routine: F) -> Result<()>
    where
        R: 'static,
        F: FnMut() -> R + 'static,
    {
        let routine = typed_routine::<(), R, F>(self.id, routine)?;
        Runtime::reset(self.id, routine)
    }
}

impl Reactive for Action {
    type Value = ();

    fn node_id(&self) -> NodeId {
        self.id
    }
}

/// Create an [`Action`] from `routine`.
pub fn action<F>(routine: F) -> Action
where
    F: FnMut() + 'static,
{
    Action::new(routine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactionError;
    use crate::reactive::{Changed, Var};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        (Rc::clone(&runs), runs)
    }

    #[test]
    fn action_runs_on_creation_and_on_change() {
        let (runs, counter) = counter();
        let count = Var::new(0);
        let _effect = action(move || {
            count.get();
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        count.set(1);
        assert_eq!(runs.get(), 2);

        count.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn action_without_dependencies_runs_once() {
        let (runs, counter) = counter();
        let unrelated = Var::new(0);
        let _effect = Action::new(move || counter.set(counter.get() + 1));

        unrelated.set(5);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn closed_action_stops_running() {
        let (runs, counter) = counter();
        let count = Var::new(0);
        let effect = Action::new(move || {
            count.get();
            counter.set(counter.get() + 1);
        });

        effect.close();
        count.set(1);
        assert_eq!(runs.get(), 1);
        assert!(!effect.is_valid());
    }

    #[test]
    fn reset_swaps_the_routine() {
        let (runs, counter) = counter();
        let first = Var::new(0);
        let second = Var::new(0);
        let effect = Action::new(move || {
            first.get();
        });
        effect
            .reset(move || {
                second.get();
                counter.set(counter.get() + 1);
            })
            .unwrap();
        assert_eq!(runs.get(), 1);

        first.set(1);
        assert_eq!(runs.get(), 1);
        second.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn reset_requires_unit_routine() {
        let effect = Action::new(|| {});
        let err = effect.reset(|| 5).unwrap_err();
        assert!(matches!(err, ReactionError::ReturnType { found: "i32", .. }));
    }

    #[test]
    fn options_can_override_the_default_trigger() {
        let (runs, counter) = counter();
        let count = Var::new(0);
        let effect = Action::with_options(
            move || {
                count.get();
                counter.set(counter.get() + 1);
            },
            NodeOptions::new().trigger(Changed),
        );

        count.set(1);
        assert_eq!(runs.get(), 2);
        assert!(effect.try_get().is_ok());
    }
}
