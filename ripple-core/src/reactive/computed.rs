//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when one of
//! the values it read last time has changed.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function inside a reactive
//!    context and caches the result. Every signal or computed read during
//!    that run becomes a dependency.
//!
//! 2. When a dependency changes, the computed is marked dirty and its own
//!    subscribers are notified right away. Nothing is recomputed yet.
//!
//! 3. On next access, a dirty computed detaches from all of its previous
//!    dependencies, runs again and records a fresh dependency set. Branches
//!    that were not taken this time no longer invalidate it.
//!
//! # Why This Matters
//!
//! Invalidation is pushed eagerly but evaluation is pulled lazily:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! # Threads
//!
//! Recomputation is serialized per computed. A thread that reads while
//! another is recomputing waits and then takes the fresh value. Only a read
//! from the computing thread itself counts as a cycle; it gets the previous
//! value, or `T::default()` if there is none yet.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use super::context::{Dependencies, ReactiveContext};
use super::error::ReactiveError;
use super::runtime::Runtime;
use super::signal::{SignalLike, Subscription};
use super::subscriber::{next_source_id, Source, Subscriber, SubscriberId, SubscriberSet};

struct ComputedInner<T> {
    /// Identity as a source, shared with signals' id space.
    id: u64,

    /// The subscriber this computed registers with its dependencies.
    invalidator: Subscriber,

    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    dirty: AtomicBool,

    /// Held for the whole of a recompute. Readers on other threads wait
    /// here instead of computing the same value twice.
    evaluation: Mutex<()>,

    /// The thread running `compute`, to catch a computed reading itself.
    computing: Mutex<Option<ThreadId>>,

    /// Sources read during the last computation.
    dependencies: Mutex<Dependencies>,

    /// Subscribers that depend on this computed.
    subscribers: SubscriberSet,
}

impl<T> ComputedInner<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Called through `invalidator` when any dependency changes.
    ///
    /// Only the clean-to-dirty transition propagates. Subscribers of a
    /// computed that is already dirty have been told and not read it since.
    fn invalidate(&self) {
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::trace!(computed = self.id, "computed invalidated");
        Runtime::notify(self.subscribers.snapshot());
    }

    fn read(&self) -> T {
        if let Some(value) = self.cached() {
            return value;
        }
        self.recompute(false)
    }

    /// The cached value, if there is one and no evaluation is replacing it.
    fn cached(&self) -> Option<T> {
        if self.dirty.load(Ordering::SeqCst) || self.computing.lock().is_some() {
            return None;
        }
        self.value.read().clone()
    }

    fn recompute(&self, force: bool) -> T {
        let current = thread::current().id();
        if *self.computing.lock() == Some(current) {
            return self.cyclic_read();
        }

        let _evaluation = self.evaluation.lock();

        // Another thread may have finished while this one waited.
        if !force {
            if let Some(value) = self.cached() {
                return value;
            }
        }

        struct ComputeGuard<'a, T>(&'a ComputedInner<T>);

        impl<T> Drop for ComputeGuard<'_, T> {
            fn drop(&mut self) {
                if thread::panicking() {
                    self.0.dirty.store(true, Ordering::SeqCst);
                }
                *self.0.computing.lock() = None;
            }
        }

        *self.computing.lock() = Some(current);
        let _guard = ComputeGuard(self);

        let stale = std::mem::take(&mut *self.dependencies.lock());
        for source in stale {
            source.remove_subscriber(self.invalidator.id());
        }

        // Cleared before running so a write that lands mid-computation
        // leaves the computed dirty.
        self.dirty.store(false, Ordering::SeqCst);

        let ctx = ReactiveContext::enter(self.invalidator.clone());
        let value = (self.compute)();
        let dependencies = ctx.exit();

        tracing::trace!(
            computed = self.id,
            dependencies = dependencies.len(),
            "computed recomputed"
        );

        *self.dependencies.lock() = dependencies;
        *self.value.write() = Some(value.clone());
        value
    }

    /// A computed read itself while computing. The graph has a cycle; hand
    /// back the last value, or `T::default()` before the first one, rather
    /// than recursing forever.
    fn cyclic_read(&self) -> T {
        tracing::warn!(computed = self.id, "computed read itself during evaluation");
        self.value.read().clone().unwrap_or_default()
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn source_id(&self) -> u64 {
        self.id
    }

    fn add_subscriber(&self, subscriber: Subscriber) {
        self.subscribers.insert(subscriber);
    }

    fn remove_subscriber(&self, id: SubscriberId) {
        self.subscribers.remove(id);
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for source in self.dependencies.get_mut().drain(..) {
            source.remove_subscriber(self.invalidator.id());
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Clones share the same cache and dependency set.
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            ComputedInner {
                id: next_source_id(),
                invalidator: Subscriber::invalidator(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                }),
                compute: Box::new(compute),
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                evaluation: Mutex::new(()),
                computing: Mutex::new(None),
                dependencies: Mutex::new(Dependencies::new()),
                subscribers: SubscriberSet::new(),
            }
        });

        Self { inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a reactive context, the running computation is
    /// subscribed to this computed, so computeds can be chained. A computed
    /// that reads itself gets its previous value instead of recursing.
    pub fn get(&self) -> T {
        let value = self.inner.read();
        if ReactiveContext::is_active() {
            ReactiveContext::track(self.inner.clone());
        }
        value
    }

    /// Get the current value without tracking. Still recomputes when dirty.
    pub fn peek(&self) -> T {
        self.inner.read()
    }

    /// Computeds are read-only; this always fails.
    pub fn try_set(&self, _value: T) -> Result<(), ReactiveError> {
        Err(ReactiveError::ReadOnlyComputed)
    }

    /// Recompute now, whether or not anything changed.
    pub fn refresh(&self) {
        self.inner.recompute(true);
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Register a callback invoked whenever this computed is invalidated.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(callback);
        let id = subscriber.id();
        self.inner.subscribers.insert(subscriber);

        let inner: Arc<dyn Source> = self.inner.clone();
        Subscription::new(Arc::downgrade(&inner), id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("has_value", &self.has_value())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl<T> SignalLike<T> for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }

    fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        Computed::try_set(self, value)
    }

    fn subscribe_with(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe(callback)
    }
}

/// Create a new computed. Shorthand for [`Computed::new`].
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
