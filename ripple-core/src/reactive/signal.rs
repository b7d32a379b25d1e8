//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, all subscribers are notified. Writing an equal value does nothing.
//!
//! 3. Notifications go through the [`Runtime`], which defers them while a
//!    batch is open.
//!
//! # Thread Safety
//!
//! Signals are `Send + Sync`. The value sits behind a `parking_lot` lock and
//! no lock is held while subscriber callbacks run.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::error::ReactiveError;
use super::runtime::Runtime;
use super::subscriber::{next_source_id, Source, Subscriber, SubscriberId, SubscriberSet};

/// Equality used to decide whether a write is a change.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Shared state behind a [`Signal`] and all of its clones.
struct SignalInner<T> {
    id: u64,
    value: RwLock<T>,
    equals: EqualsFn<T>,
    subscribers: SubscriberSet,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
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

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Writes are compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, <T as PartialEq>::eq)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal with a custom notion of "unchanged".
    ///
    /// Useful for types without `PartialEq`, or for floats where NaN should
    /// compare equal to itself.
    pub fn with_equality(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_source_id(),
                value: RwLock::new(value),
                equals,
                subscribers: SubscriberSet::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        if ReactiveContext::is_active() {
            ReactiveContext::track(self.inner.clone());
        }
        self.peek()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// Does nothing if the new value is equal to the current one.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if (self.inner.equals)(&*guard, &value) {
                return;
            }
            *guard = value;
        }

        Runtime::notify(self.inner.subscribers.snapshot());
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&*self.inner.value.read());
        self.set(new_value);
    }

    /// Register a callback invoked on every change.
    ///
    /// This path is independent of automatic tracking. The callback keeps
    /// firing until [`Subscription::unsubscribe`] is called.
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
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it leaves the callback registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it. Calling it more
/// than once is harmless.
pub struct Subscription {
    source: Weak<dyn Source>,
    id: SubscriberId,
}

impl Subscription {
    pub(crate) fn new(source: Weak<dyn Source>, id: SubscriberId) -> Self {
        Self { source, id }
    }

    /// The id of the registered callback.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback from its source.
    pub fn unsubscribe(&self) {
        if let Some(source) = self.source.upgrade() {
            source.remove_subscriber(self.id);
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// The read side shared by signals and computeds.
///
/// A computed is a signal that refuses writes: `try_set` succeeds on a
/// [`Signal`] and fails with [`ReactiveError::ReadOnlyComputed`] on a
/// [`Computed`](super::Computed).
pub trait SignalLike<T> {
    /// Read the value, tracking it in the active context.
    fn get(&self) -> T;

    /// Read the value without tracking.
    fn peek(&self) -> T;

    /// Write the value if this cell is writable.
    fn try_set(&self, value: T) -> Result<(), ReactiveError>;

    /// Register a change callback.
    fn subscribe_with(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

impl<T> SignalLike<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }

    fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        self.set(value);
        Ok(())
    }

    fn subscribe_with(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe(callback)
    }
}

/// Create a new signal. Shorthand for [`Signal::new`].
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        (count, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let (count, callback) = counter();
        let _sub = signal.subscribe(callback);

        assert_eq!(count.load(Ordering::SeqCst), 0);

        signal.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let signal = Signal::new(String::from("a"));
        let (count, callback) = counter();
        let _sub = signal.subscribe(callback);

        signal.set(String::from("b"));
        signal.set(String::from("b"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_equality_controls_notification() {
        fn same_nan(a: &f64, b: &f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }

        let signal = Signal::with_equality(f64::NAN, same_nan);
        let (count, callback) = counter();
        let _sub = signal.subscribe(callback);

        signal.set(f64::NAN);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        signal.set(1.5);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_unsubscribe_is_idempotent() {
        let signal = Signal::new(0);
        let (count, callback) = counter();
        let sub = signal.subscribe(callback);

        signal.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        signal.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn peek_does_not_track() {
        let signal = Signal::new(3);
        let _ctx = ReactiveContext::enter(Subscriber::new(|| {}));

        assert_eq!(signal.peek(), 3);
        assert_eq!(signal.subscriber_count(), 0);

        assert_eq!(signal.get(), 3);
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_try_set_succeeds() {
        let s = signal(1);
        assert!(SignalLike::try_set(&s, 2).is_ok());
        assert_eq!(s.peek(), 2);
    }

    #[test]
    fn subscriber_may_unsubscribe_during_notification() {
        let signal = Signal::new(0);
        let slot: Arc<parking_lot::Mutex<Option<Subscription>>> = Arc::default();
        let (count, bump) = counter();

        let slot_clone = slot.clone();
        let sub = signal.subscribe(move || {
            bump();
            if let Some(sub) = slot_clone.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        signal.set(1);
        signal.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
