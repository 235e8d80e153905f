//! Per-node configuration.

use std::any::Any;
use std::fmt;

use crate::graph::NodeKind;

use super::invalidation::{DirectClose, InvalidationStrategy};
use super::trigger::{Always, Changed, Threshold, TriggerPolicy};

/// Options accepted by every `with_options` constructor.
///
/// ```
/// use reaction_core::prelude::*;
///
/// let price = Var::with_options(100, NodeOptions::new().name("price").trigger(Always));
/// let doubled = Calc::with_options(
///     move || price.get() * 2,
///     NodeOptions::new().invalidation(LastVal),
/// );
/// assert_eq!(doubled.get(), 200);
/// ```
#[derive(Default)]
pub struct NodeOptions {
    name: Option<String>,
    trigger: Option<Box<dyn TriggerPolicy>>,
    threshold: Option<Threshold>,
    invalidation: Option<Box<dyn InvalidationStrategy>>,
}

/// Options resolved against the defaults for a node kind.
pub(crate) struct NodeParts {
    pub name: Option<String>,
    pub trigger: Box<dyn TriggerPolicy>,
    pub threshold: Option<Threshold>,
    pub invalidation: Box<dyn InvalidationStrategy>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostic name, shown in logs and snapshots.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Trigger policy deciding when dependents are notified.
    ///
    /// Passing a [`Threshold`] makes `configure_threshold` available on the
    /// node's handle.
    pub fn trigger<P>(mut self, policy: P) -> Self
    where
        P: TriggerPolicy + 'static,
    {
        self.threshold = (&policy as &dyn Any).downcast_ref::<Threshold>().cloned();
        self.trigger = Some(Box::new(policy));
        self
    }

    /// Strategy applied when one of the node's dependencies is closed.
    pub fn invalidation<S>(mut self, strategy: S) -> Self
    where
        S: InvalidationStrategy + 'static,
    {
        self.invalidation = Some(Box::new(strategy));
        self
    }

    pub(crate) fn into_parts(self, kind: NodeKind) -> NodeParts {
        let trigger = self.trigger.unwrap_or_else(|| match kind {
            NodeKind::Effect => Box::new(Always),
            _ => Box::new(Changed),
        });

        NodeParts {
            name: self.name,
            trigger,
            threshold: self.threshold,
            invalidation: self.invalidation.unwrap_or_else(|| Box::new(DirectClose)),
        }
    }
}

impl fmt::Debug for NodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeOptions")
            .field("name", &self.name)
            .field("trigger", &self.trigger.is_some())
            .field("threshold", &self.threshold)
            .field("invalidation", &self.invalidation.is_some())
            .finish()
    }
}
