//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a node is read,
//! we can record it as a dependency of the current computation.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a calc or action), we push
//! an entry onto the stack. When the computation completes, we pop it and
//! hand the collected reads to the registry, which diffs them against the
//! node's previous edges.
//!
//! This design supports nested reactive contexts (e.g., a calc whose read of
//! another calc forces that calc to settle first).

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::graph::{NodeId, Reads};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The node whose routine is running, if any.
    subscriber: Option<NodeId>,
    /// Whether reads in this entry are recorded.
    tracking: bool,
    /// Nodes read so far, with the values they served.
    reads: Reads,
}

/// Guard that pops the context when dropped.
///
/// This keeps the context stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a new tracking context for the given node.
    ///
    /// While this context is active, every node that is read is recorded as
    /// a dependency of `subscriber`.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(subscriber: NodeId) -> Self {
        Self::push(Some(subscriber), true)
    }

    /// Enter a context in which reads are not recorded.
    ///
    /// The current subscriber stays visible, so reads of values frozen for it
    /// still resolve.
    fn untracked() -> Self {
        let subscriber = Self::current_subscriber();
        Self::push(subscriber, false)
    }

    fn push(subscriber: Option<NodeId>, tracking: bool) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                tracking,
                reads: Reads::default(),
            });
        });

        Self { subscriber }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().last().is_some_and(|entry| entry.tracking))
    }

    /// Get the node whose routine is running, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber))
    }

    /// Record a dependency on the given node.
    ///
    /// This is called by handles when they are read.
    pub fn track_dependency(node: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.tracking {
                    entry.reads.nodes.insert(node);
                }
            }
        });
    }

    /// Record a dependency together with the value it served.
    ///
    /// `value` is only called when reads are being recorded.
    pub(crate) fn track_read(node: NodeId, value: impl FnOnce() -> Rc<dyn Any>) {
        if !Self::is_active() {
            return;
        }
        let value = value();
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.reads.nodes.insert(node);
                entry.reads.values.insert(node, value);
            }
        });
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.reads.nodes.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Exit the context, returning the dependencies it collected.
    pub fn finish(self) -> IndexSet<NodeId> {
        self.finish_reads().nodes
    }

    fn finish_reads(self) -> Reads {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.reads))
                .unwrap_or_default()
        })
    }

    /// Run `routine` as the evaluation of `subscriber`, returning its result
    /// and everything it read.
    pub(crate) fn track<T>(subscriber: NodeId, routine: impl FnOnce() -> T) -> (T, Reads) {
        let ctx = Self::enter(subscriber);
        let value = routine();
        (value, ctx.finish_reads())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber, self.subscriber,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber, entry.subscriber
                );
            }
        });
    }
}

/// Run `f` without recording any of its reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
