//! Typed Value Holder
//!
//! `ValueCell<T>` is the typed half of a node: its current value, its
//! evaluation routine (for computations) and its trigger policy. The registry
//! only sees it through the erased `NodeBody` trait.
//!
//! None of these methods touch the registry, so the runtime can call them
//! with the registry released while user code (routines, policies) runs.

use std::any::{type_name, Any};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::warn;

use crate::graph::{Evaluation, NodeBody, NodeId, Reads};

use super::context::ReactiveContext;
use super::trigger::{Change, Threshold, TriggerPolicy};

/// Evaluation routine of a computation node.
pub(crate) type Routine<T> = Box<dyn FnMut() -> T>;

pub(crate) struct ValueCell<T> {
    value: RefCell<T>,
    routine: RefCell<Option<Routine<T>>>,
    running: Cell<bool>,
    trigger: RefCell<Box<dyn TriggerPolicy>>,
    threshold: Option<Threshold>,
}

impl<T> ValueCell<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new(
        value: T,
        routine: Option<Routine<T>>,
        trigger: Box<dyn TriggerPolicy>,
        threshold: Option<Threshold>,
    ) -> Self {
        Self {
            value: RefCell::new(value),
            routine: RefCell::new(routine),
            running: Cell::new(false),
            trigger: RefCell::new(trigger),
            threshold,
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store a new value and ask the trigger policy whether to propagate.
    ///
    /// The policy sees the new value already in place.
    pub fn assign(&self, id: NodeId, value: T) -> bool {
        let old = self.value.replace(value);
        let current = self.value.borrow();
        let changed = *current != old;
        self.consult(id, &old, &current, changed)
    }

    /// Replace the evaluation routine.
    pub fn install(&self, routine: Routine<T>) {
        *self.routine.borrow_mut() = Some(routine);
    }

    /// Run the evaluation routine inside a tracking scope.
    ///
    /// Returns `None` if the node has no routine or is already running.
    pub fn run(&self, id: NodeId) -> Option<(T, Reads)> {
        if self.running.replace(true) {
            return None;
        }
        let mut running = Running {
            cell: self,
            routine: self.routine.borrow_mut().take(),
        };
        let routine = running.routine.as_mut()?;
        Some(ReactiveContext::track(id, routine))
    }

    fn consult(&self, id: NodeId, old: &T, new: &T, changed: bool) -> bool {
        let change = Change::new(id, old, new, changed);
        match self.trigger.try_borrow_mut() {
            Ok(mut trigger) => trigger.should_propagate(&change),
            Err(_) => {
                warn!(node = %id, "trigger policy re-entered, falling back to equality");
                changed
            }
        }
    }
}

/// Marks a cell as running and puts its routine back afterwards, unless a
/// reset installed a new one in the meantime. Also restores on unwind.
struct Running<'a, T> {
    cell: &'a ValueCell<T>,
    routine: Option<Routine<T>>,
}

impl<T> Drop for Running<'_, T> {
    fn drop(&mut self) {
        self.cell.running.set(false);
        if let Some(routine) = self.routine.take() {
            let mut slot = self.cell.routine.borrow_mut();
            if slot.is_none() {
                *slot = Some(routine);
            }
        }
    }
}

impl<T> NodeBody for ValueCell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn snapshot(&self) -> Rc<dyn Any> {
        Rc::new(self.get())
    }

    fn recompute(&self, id: NodeId) -> Option<Evaluation> {
        let (value, reads) = self.run(id)?;
        let propagate = self.assign(id, value);
        Some(Evaluation { reads, propagate })
    }

    fn touch(&self, id: NodeId) -> bool {
        let current = self.value.borrow();
        self.consult(id, &current, &current, true)
    }

    fn threshold(&self) -> Option<Threshold> {
        self.threshold.clone()
    }
}
