//! Subscriber types for the reactive system.
//!
//! A Subscriber represents anything that wants to hear about changes to a
//! reactive value: computeds invalidating themselves, effects re-running,
//! and callbacks registered through `subscribe`.
//!
//! Subscribers are identified by a [`SubscriberId`] rather than by pointer.
//! Every subscriber set is keyed by that id, so a subscriber registered twice
//! is still notified once, and delivery follows registration order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed, effect, or manual callback) gets a unique ID
/// when created. This ID is used to deduplicate subscriptions and to remove
/// a subscriber from the sets it joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber to reactive values.
///
/// Cloning a subscriber shares the callback; both clones carry the same id
/// and are therefore the same subscriber as far as any set is concerned.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
    /// Marks a computed's invalidator. Invalidators run while a change is
    /// still propagating; everything else waits until propagation is done.
    invalidator: bool,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(SubscriberId::new(), notify)
    }

    /// Create a subscriber that reuses an existing id.
    pub(crate) fn with_id<F>(id: SubscriberId, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            notify: Arc::new(notify),
            invalidator: false,
        }
    }

    /// Create the subscriber a computed registers with its dependencies.
    pub(crate) fn invalidator<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            invalidator: true,
            ..Self::new(notify)
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_invalidator(&self) -> bool {
        self.invalidator
    }

    /// Notify the subscriber that one of its dependencies changed.
    pub fn notify(&self) {
        (self.notify)();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("invalidator", &self.invalidator)
            .finish()
    }
}

/// An insertion-ordered set of subscribers keyed by id.
///
/// The lock is only held to mutate or snapshot the set. Callbacks always run
/// on a snapshot so they are free to subscribe or unsubscribe re-entrantly.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<IndexMap<SubscriberId, Subscriber>>,
}

impl SubscriberSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Re-adding an existing id keeps its original position.
    pub(crate) fn insert(&self, subscriber: Subscriber) {
        self.entries
            .lock()
            .entry(subscriber.id())
            .or_insert(subscriber);
    }

    /// Remove a subscriber, returning whether it was present.
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        self.entries.lock().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Copy the current subscribers out in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Subscriber> {
        self.entries.lock().values().cloned().collect()
    }
}

/// Anything a computation can depend on.
///
/// Signals and computeds implement this so the tracking context can record
/// them as dependencies and later detach a subscriber from them.
pub(crate) trait Source: Send + Sync {
    /// Stable identity used to deduplicate dependencies.
    fn source_id(&self) -> u64;

    fn add_subscriber(&self, subscriber: Subscriber);

    fn remove_subscriber(&self, id: SubscriberId);
}

/// Counter for generating unique source IDs.
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique source ID, shared by signals and computeds.
pub(crate) fn next_source_id() -> u64 {
    SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicBool, Ordering};

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move || {
            called_clone.store(true, Ordering::SeqCst);
        });

        assert!(!called.load(Ordering::SeqCst));
        subscriber.notify();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn set_deduplicates_by_id() {
        let set = SubscriberSet::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let subscriber = Subscriber::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        set.insert(subscriber.clone());
        set.insert(subscriber.clone());
        assert_eq!(set.len(), 1);

        for s in set.snapshot() {
            s.notify();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_preserves_registration_order() {
        let set = SubscriberSet::new();
        let first = Subscriber::new(|| {});
        let second = Subscriber::new(|| {});
        let third = Subscriber::new(|| {});

        set.insert(second.clone());
        set.insert(first.clone());
        set.insert(third.clone());
        set.insert(second.clone());

        let order: Vec<_> = set.snapshot().iter().map(Subscriber::id).collect();
        assert_eq!(order, vec![second.id(), first.id(), third.id()]);

        assert!(set.remove(first.id()));
        assert!(!set.remove(first.id()));
        assert_eq!(set.len(), 2);
    }
}
