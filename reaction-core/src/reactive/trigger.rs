//! Trigger Policies
//!
//! Every node carries one trigger policy. After the node's value is assigned
//! or recomputed, the policy decides whether its dependents are notified.
//!
//! Built-in policies:
//!
//! - [`Changed`]: notify only if the new value differs from the old one.
//! - [`Always`]: notify on every write or evaluation.
//! - [`Threshold`]: notify only while a configured predicate holds.
//!
//! Any type implementing [`TriggerPolicy`] can be used instead, including
//! closures of the form `FnMut(&Change<'_>) -> bool`.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::graph::NodeId;

use super::context::untrack;

/// A value change presented to a trigger policy.
pub struct Change<'a> {
    node: NodeId,
    old: &'a dyn Any,
    new: &'a dyn Any,
    changed: bool,
}

impl<'a> Change<'a> {
    pub(crate) fn new(node: NodeId, old: &'a dyn Any, new: &'a dyn Any, changed: bool) -> Self {
        Self {
            node,
            old,
            new,
            changed,
        }
    }

    /// The node whose value changed.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the new value compares unequal to the old one.
    ///
    /// Also `true` when a field of the node's aggregate was written, since
    /// the aggregate itself compares equal in that case.
    pub fn value_changed(&self) -> bool {
        self.changed
    }

    /// The previous value, if it has type `T`.
    pub fn old_value<T: 'static>(&self) -> Option<&T> {
        self.old.downcast_ref()
    }

    /// The value now stored in the node, if it has type `T`.
    pub fn new_value<T: 'static>(&self) -> Option<&T> {
        self.new.downcast_ref()
    }
}

impl fmt::Debug for Change<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Change")
            .field("node", &self.node)
            .field("changed", &self.changed)
            .finish_non_exhaustive()
    }
}

/// Decides whether a node's change is propagated to its dependents.
pub trait TriggerPolicy {
    fn should_propagate(&mut self, change: &Change<'_>) -> bool;
}

impl<F> TriggerPolicy for F
where
    F: FnMut(&Change<'_>) -> bool,
{
    fn should_propagate(&mut self, change: &Change<'_>) -> bool {
        self(change)
    }
}

/// Propagate only when the value actually changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Changed;

impl TriggerPolicy for Changed {
    fn should_propagate(&mut self, change: &Change<'_>) -> bool {
        change.value_changed()
    }
}

/// Propagate on every write and every evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl TriggerPolicy for Always {
    fn should_propagate(&mut self, _change: &Change<'_>) -> bool {
        true
    }
}

type Predicate = Box<dyn FnMut() -> bool>;

/// Propagate only while a predicate holds.
///
/// The predicate may read reactive state; those reads are not recorded as
/// dependencies. Until a predicate is configured nothing propagates.
///
/// Clones share the same predicate, so a `Threshold` kept outside the node
/// can reconfigure it later.
#[derive(Clone, Default)]
pub struct Threshold {
    predicate: Rc<RefCell<Option<Predicate>>>,
}

impl Threshold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a threshold that is configured from the start.
    pub fn when<F>(predicate: F) -> Self
    where
        F: FnMut() -> bool + 'static,
    {
        let threshold = Self::new();
        threshold.configure(predicate);
        threshold
    }

    /// Replace the predicate.
    pub fn configure<F>(&self, predicate: F)
    where
        F: FnMut() -> bool + 'static,
    {
        *self.predicate.borrow_mut() = Some(Box::new(predicate));
    }

    pub fn is_configured(&self) -> bool {
        self.predicate.borrow().is_some()
    }

    fn check(&self) -> bool {
        // A predicate that re-enters its own threshold sees `false`.
        let Ok(mut predicate) = self.predicate.try_borrow_mut() else {
            return false;
        };
        match predicate.as_mut() {
            Some(predicate) => untrack(predicate),
            None => false,
        }
    }
}

impl TriggerPolicy for Threshold {
    fn should_propagate(&mut self, _change: &Change<'_>) -> bool {
        self.check()
    }
}

impl fmt::Debug for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Threshold")
            .field("configured", &self.is_configured())
            .finish()
    }
}
