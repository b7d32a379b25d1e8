//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., recomputing a computed or running
//! an effect), we push the subscriber onto the stack. When the computation
//! completes, we pop it, which restores whatever was running before.
//!
//! This design supports nested reactive contexts (e.g., an effect that reads
//! a computed, which recomputes and reads another computed).
//!
//! An entry without a subscriber is an untracked scope: reads inside it do
//! not register anything, even if an outer computation is active.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use super::subscriber::{Source, Subscriber, SubscriberId};

/// The sources a computation read during one run, in first-read order.
pub(crate) type Dependencies = SmallVec<[Arc<dyn Source>; 4]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The computation being tracked, or `None` inside `untracked`.
    subscriber: Option<Subscriber>,
    /// Sources read during this computation.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics, and that a panicking computation does not stay
/// subscribed to what it read before the panic.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    exited: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any signal or computed that is read
    /// registers the subscriber as a dependent.
    pub fn enter(subscriber: Subscriber) -> Self {
        let subscriber_id = Some(subscriber.id());
        Self::push(Some(subscriber));
        Self {
            subscriber_id,
            exited: false,
        }
    }

    /// Enter a scope in which reads create no dependencies.
    pub fn untracked() -> Self {
        Self::push(None);
        Self {
            subscriber_id: None,
            exited: false,
        }
    }

    fn push(subscriber: Option<Subscriber>) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber,
                dependencies: SmallVec::new(),
            });
        });
    }

    /// Check if a tracking computation is currently running.
    ///
    /// Returns `false` inside an untracked scope.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber.as_ref().map(Subscriber::id))
        })
    }

    /// Record a read of `source` by the running computation.
    ///
    /// Subscribes the computation to the source and remembers the source so
    /// the computation can detach from it before its next run. Reading the
    /// same source twice in one run records it once.
    pub(crate) fn track(source: Arc<dyn Source>) {
        let subscriber = CONTEXT_STACK.with(|stack| {
            let stack = stack.borrow();
            let entry = stack.last()?;
            let subscriber = entry.subscriber.clone()?;
            let seen = entry
                .dependencies
                .iter()
                .any(|dep| dep.source_id() == source.source_id());
            (!seen).then_some(subscriber)
        });

        let Some(subscriber) = subscriber else {
            return;
        };

        source.add_subscriber(subscriber);
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.dependencies.push(source);
            }
        });
    }

    /// Number of sources recorded so far in the innermost context.
    pub fn dependency_count() -> usize {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.len())
                .unwrap_or_default()
        })
    }

    /// Leave the context and hand back the sources it read.
    pub(crate) fn exit(mut self) -> Dependencies {
        self.exited = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber.as_ref().map(Subscriber::id),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
        popped
    }
}

impl Drop for ReactiveContext {
    /// Dropped without [`exit`](Self::exit), typically because the
    /// computation panicked. The sources it read so far are already
    /// subscribed to it; detach them since no one will own the list.
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        let Some(entry) = self.pop() else {
            return;
        };
        if let Some(subscriber) = entry.subscriber {
            for source in entry.dependencies {
                source.remove_subscriber(subscriber.id());
            }
        }
    }
}

/// Run `f` without recording any dependencies.
///
/// Reads inside `f` return current values but do not subscribe the running
/// computation, however deeply nested the reads are.
///
/// ```rust,ignore
/// let total = computed(move || a.get() + untracked(|| b.get()));
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
