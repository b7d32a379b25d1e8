//! Reactive Runtime
//!
//! The runtime is the central coordinator for change propagation. Signals and
//! computeds hand it the subscribers they want notified.
//!
//! # Two Phases
//!
//! A change propagates in two passes:
//!
//! 1. Invalidation. Computed invalidators run right away. Each marks its
//!    computed dirty and hands its own subscribers back to the runtime, so
//!    the whole downstream graph is dirty before anything observes it.
//!
//! 2. Delivery. Every other subscriber (effects, `subscribe` callbacks) is
//!    queued in a pending set keyed by subscriber id and runs once, after
//!    invalidation has finished. A subscriber reached through several
//!    changed values is therefore queued once.
//!
//! A write outside any batch opens an implicit one, so the same ordering
//! holds for single writes. Delivery follows the order subscribers were
//! first queued.
//!
//! # Thread Safety
//!
//! Batch state is thread-local, like the tracking context. A batch opened on
//! one thread does not defer notifications caused by writes on another.

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Per-thread propagation state.
pub struct Runtime {
    batch_depth: Cell<u32>,
    pending: RefCell<IndexMap<SubscriberId, Subscriber>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            batch_depth: Cell::new(0),
            pending: RefCell::new(IndexMap::new()),
        }
    }

    /// Deliver a change notification to `subscribers`.
    ///
    /// Invalidators run immediately; the rest are queued and delivered when
    /// the enclosing batch ends, or at the end of this call if none is open.
    pub fn notify(subscribers: Vec<Subscriber>) {
        if subscribers.is_empty() {
            return;
        }

        batch(|| {
            for subscriber in subscribers {
                if subscriber.is_invalidator() {
                    subscriber.notify();
                } else {
                    Self::enqueue(subscriber);
                }
            }
        });
    }

    fn enqueue(subscriber: Subscriber) {
        RUNTIME.with(|rt| {
            rt.pending
                .borrow_mut()
                .entry(subscriber.id())
                .or_insert(subscriber);
        });
    }

    fn next_pending() -> Option<Subscriber> {
        RUNTIME.with(|rt| {
            rt.pending
                .borrow_mut()
                .shift_remove_index(0)
                .map(|(_, subscriber)| subscriber)
        })
    }

    /// Check if we're inside a batch on this thread.
    pub fn is_batching() -> bool {
        RUNTIME.with(|rt| rt.batch_depth.get() > 0)
    }

    /// Number of distinct subscribers waiting for the current batch to end.
    pub fn pending_count() -> usize {
        RUNTIME.with(|rt| rt.pending.borrow().len())
    }

    fn enter_batch() {
        RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
    }

    /// Leave one batch level, returning the remaining depth.
    fn exit_batch() -> u32 {
        RUNTIME.with(|rt| {
            let depth = rt.batch_depth.get().saturating_sub(1);
            rt.batch_depth.set(depth);
            depth
        })
    }

    fn take_pending() -> IndexMap<SubscriberId, Subscriber> {
        RUNTIME.with(|rt| std::mem::take(&mut *rt.pending.borrow_mut()))
    }

    /// Deliver every queued notification.
    ///
    /// Depth is zero here. A callback that writes opens its own implicit
    /// batch, whose flush drains the same queue, so a subscriber still
    /// waiting here is not delivered twice.
    fn flush() {
        struct DiscardOnPanic;

        impl Drop for DiscardOnPanic {
            fn drop(&mut self) {
                if std::thread::panicking() {
                    Runtime::take_pending();
                }
            }
        }

        let _discard = DiscardOnPanic;
        let mut delivered = 0usize;
        while let Some(subscriber) = Self::next_pending() {
            subscriber.notify();
            delivered += 1;
        }

        if delivered > 1 {
            tracing::debug!(subscribers = delivered, "flushed batched notifications");
        }
    }
}

/// Batch multiple signal updates into a single notification pass.
///
/// Without batching, each write notifies its subscribers immediately. Inside
/// a batch, every affected subscriber is notified once, after the outermost
/// batch body returns. Batches nest; only the outermost one flushes.
///
/// ```rust,ignore
/// batch(|| {
///     a.set(5);
///     b.set(10);
/// });
/// // effects depending on both `a` and `b` ran once
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    // Guard so the depth is restored even if `f` panics.
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            if Runtime::exit_batch() > 0 {
                return;
            }
            if std::thread::panicking() {
                Runtime::take_pending();
            } else {
                Runtime::flush();
            }
        }
    }

    Runtime::enter_batch();
    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    Runtime::is_batching()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting_subscriber() -> (Subscriber, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let subscriber = Subscriber::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (subscriber, count)
    }

    #[test]
    fn notify_outside_batch_is_immediate() {
        let (subscriber, count) = counting_subscriber();

        Runtime::notify(vec![subscriber]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_defers_and_deduplicates() {
        let (subscriber, count) = counting_subscriber();

        batch(|| {
            Runtime::notify(vec![subscriber.clone()]);
            Runtime::notify(vec![subscriber.clone()]);
            assert_eq!(Runtime::pending_count(), 1);
            assert_eq!(count.load(Ordering::SeqCst), 0);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(Runtime::pending_count(), 0);
    }

    #[test]
    fn only_outermost_batch_flushes() {
        let (subscriber, count) = counting_subscriber();

        batch(|| {
            batch(|| {
                Runtime::notify(vec![subscriber.clone()]);
            });
            assert!(is_batching());
            assert_eq!(count.load(Ordering::SeqCst), 0);
        });

        assert!(!is_batching());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidators_run_before_queued_subscribers() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let queued = {
            let order = order.clone();
            Subscriber::new(move || order.lock().push("queued"))
        };
        let invalidator = {
            let order = order.clone();
            Subscriber::invalidator(move || order.lock().push("invalidated"))
        };

        Runtime::notify(vec![queued, invalidator]);
        assert_eq!(*order.lock(), vec!["invalidated", "queued"]);
    }

    #[test]
    fn writes_during_flush_do_not_redeliver() {
        let (second, count) = counting_subscriber();
        let first = {
            let second = second.clone();
            Subscriber::new(move || Runtime::notify(vec![second.clone()]))
        };

        Runtime::notify(vec![first, second]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_returns_body_value() {
        assert_eq!(batch(|| 7), 7);
    }

    #[test]
    fn batch_depth_restored_after_panic() {
        let (subscriber, count) = counting_subscriber();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch(|| {
                Runtime::notify(vec![subscriber.clone()]);
                panic!("boom");
            })
        }));

        assert!(result.is_err());
        assert!(!is_batching());
        assert_eq!(Runtime::pending_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
