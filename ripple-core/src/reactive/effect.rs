//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs synchronously (or once
//!    at the end of the enclosing batch).
//!
//! 3. Before re-running, the effect runs the cleanup returned by its previous
//!    run, detaches from its old dependencies and tracks new ones during
//!    execution.
//!
//! # Lifetime
//!
//! An effect keeps itself alive until [`Effect::dispose`] is called. Dropping
//! every `Effect` handle does not stop it.
//!
//! # Re-entrancy
//!
//! If an effect writes a signal it depends on, the resulting notification
//! reaches the effect while it is still running. That notification is
//! dropped rather than recursing into the effect again.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::{Dependencies, ReactiveContext};
use super::subscriber::{next_source_id, Subscriber};

/// Teardown returned by an effect run.
///
/// Runs before the next run of the same effect and when it is disposed.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

type EffectFn = Box<dyn FnMut() -> Option<Cleanup> + Send>;

struct EffectInner {
    id: u64,

    /// The subscriber this effect registers with its dependencies.
    subscriber: Subscriber,

    run: Mutex<EffectFn>,

    /// Cleanup returned by the last run.
    cleanup: Mutex<Option<Cleanup>>,

    /// Sources read during the last run.
    dependencies: Mutex<Dependencies>,

    disposed: AtomicBool,

    running: AtomicBool,

    run_count: AtomicUsize,

    /// Strong self-reference, released on dispose.
    keep_alive: Mutex<Option<Arc<EffectInner>>>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if self.running.swap(true, Ordering::SeqCst) {
            tracing::trace!(effect = self.id, "dropping re-entrant effect run");
            return;
        }

        struct RunningGuard<'a>(&'a AtomicBool);

        impl Drop for RunningGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }

        let _guard = RunningGuard(&self.running);

        let previous = self.cleanup.lock().take();
        if let Some(cleanup) = previous {
            cleanup.run();
        }
        self.detach();

        let ctx = ReactiveContext::enter(self.subscriber.clone());
        let cleanup = {
            let mut run = self.run.lock();
            (*run)()
        };
        let dependencies = ctx.exit();

        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(
            effect = self.id,
            runs,
            dependencies = dependencies.len(),
            "effect ran"
        );

        if self.disposed.load(Ordering::SeqCst) {
            // Disposed from inside its own run.
            for source in dependencies {
                source.remove_subscriber(self.subscriber.id());
            }
            if let Some(cleanup) = cleanup {
                cleanup.run();
            }
            return;
        }

        *self.dependencies.lock() = dependencies;
        *self.cleanup.lock() = cleanup;
    }

    fn detach(&self) {
        let stale = std::mem::take(&mut *self.dependencies.lock());
        for source in stale {
            source.remove_subscriber(self.subscriber.id());
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.detach();
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
        tracing::trace!(effect = self.id, "effect disposed");

        let keep_alive = self.keep_alive.lock().take();
        drop(keep_alive);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately.
    ///
    /// The function may return `()`, a [`Cleanup`], or `Option<Cleanup>`.
    pub fn new<F, R>(mut run: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: IntoCleanup,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let weak = weak.clone();
            EffectInner {
                id: next_source_id(),
                subscriber: Subscriber::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.execute();
                    }
                }),
                run: Mutex::new(Box::new(move || run().into_cleanup())),
                cleanup: Mutex::new(None),
                dependencies: Mutex::new(Dependencies::new()),
                disposed: AtomicBool::new(false),
                running: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
                keep_alive: Mutex::new(None),
            }
        });

        *inner.keep_alive.lock() = Some(inner.clone());
        inner.execute();

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop the effect.
    ///
    /// Runs the last cleanup, detaches from every dependency and suppresses
    /// any notification that arrives afterwards. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create and run an effect. Shorthand for [`Effect::new`].
pub fn effect<F, R>(run: F) -> Effect
where
    F: FnMut() -> R + Send + 'static,
    R: IntoCleanup,
{
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_on_dependency_change() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let effect = {
            let (signal, seen) = (signal.clone(), seen.clone());
            Effect::new(move || {
                seen.store(signal.get(), Ordering::SeqCst);
            })
        };

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let effect = {
            let (signal, run_count) = (signal.clone(), run_count.clone());
            Effect::new(move || {
                signal.get();
                run_count.fetch_add(1, Ordering::SeqCst);
            })
        };

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let effect = {
            let (signal, cleanups) = (signal.clone(), cleanups.clone());
            Effect::new(move || {
                signal.get();
                let cleanups = cleanups.clone();
                Cleanup::new(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        signal.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        signal.set(2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);

        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);

        effect.dispose();
        signal.set(3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn optional_cleanup_is_accepted() {
        let flag = Signal::new(false);
        let cleanups = Arc::new(AtomicI32::new(0));

        let effect = {
            let (flag, cleanups) = (flag.clone(), cleanups.clone());
            Effect::new(move || {
                let cleanups = cleanups.clone();
                flag.get().then(|| {
                    Cleanup::new(move || {
                        cleanups.fetch_add(1, Ordering::SeqCst);
                    })
                })
            })
        };

        flag.set(true);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_write_does_not_recurse() {
        let signal = Signal::new(0);

        let effect = {
            let signal = signal.clone();
            Effect::new(move || {
                let value = signal.get();
                signal.set(value + 1);
            })
        };

        assert_eq!(signal.peek(), 1);
        assert_eq!(effect.run_count(), 1);

        signal.set(10);
        assert_eq!(signal.peek(), 11);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_survives_dropped_handle() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        {
            let (signal, run_count) = (signal.clone(), run_count.clone());
            let _ = Effect::new(move || {
                signal.get();
                run_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_run_leaves_no_subscription_behind() {
        let signal = Signal::new(0);

        let effect = {
            let signal = signal.clone();
            Effect::new(move || {
                assert_ne!(signal.get(), 1, "effect rejects 1");
            })
        };
        assert_eq!(signal.subscriber_count(), 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| signal.set(1)));
        assert!(result.is_err());
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        assert_eq!(effect2.run_count(), 1);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
