//! Throttled async functions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::{AsyncError, THROTTLE_CANCELLED};
use super::schedule::{BoxedCall, Scheduler};

/// Options for [`throttle_async`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleOptions {
    /// Queue the latest call made inside an interval to run when it ends.
    /// When off, such calls are refused.
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self { trailing: true }
    }
}

/// An async function that runs at most once per interval.
pub struct Throttled<A, T, E> {
    scheduler: Arc<Scheduler<A, T, E>>,
    interval: Duration,
    options: ThrottleOptions,
}

impl<A, T, E> Clone for Throttled<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            interval: self.interval,
            options: self.options,
        }
    }
}

impl<A, T, E> std::fmt::Debug for Throttled<A, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttled")
            .field("interval", &self.interval)
            .field("options", &self.options)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<A, T, E> Throttled<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Call the function with `args`, subject to the interval.
    ///
    /// The first call of a fresh interval runs immediately. Later calls in
    /// the same interval share one trailing run, scheduled for the end of
    /// the interval with the latest arguments; each one they displace
    /// resolves with [`AsyncError::Cancelled`]. Without `trailing` those
    /// calls are refused instead. Must be called within a tokio runtime.
    pub fn call(&self, args: A) -> BoxFuture<'static, Result<T, AsyncError<E>>> {
        let mut slot = self.scheduler.lock();
        let now = Instant::now();

        let last_invoke = slot.last_invoke;
        let open_until = match last_invoke {
            Some(last) if now.duration_since(last) < self.interval => last + self.interval,
            _ => {
                if let Some(superseded) = slot.clear() {
                    superseded.reject(THROTTLE_CANCELLED);
                }
                slot.last_invoke = Some(now);
                drop(slot);
                let running = self.scheduler.run_now(args);
                return async move { running.await.map_err(AsyncError::Failed) }.boxed();
            }
        };

        if !self.options.trailing {
            tracing::trace!("throttled call refused");
            return async { Err::<T, AsyncError<E>>(cancelled()) }.boxed();
        }

        let (receiver, displaced) = slot.park(args);
        if let Some(displaced) = displaced {
            tracing::trace!("throttled call coalesced");
            displaced.reject(THROTTLE_CANCELLED);
        }
        if !slot.has_timer() {
            self.scheduler.arm(&mut slot, open_until);
        }

        async move { receiver.await.unwrap_or_else(|_| Err(cancelled())) }.boxed()
    }

    /// Drop the queued trailing call, rejecting its caller.
    pub fn cancel(&self) {
        let pending = self.scheduler.lock().clear();
        if let Some(pending) = pending {
            tracing::trace!("throttled call cancelled");
            pending.reject(THROTTLE_CANCELLED);
        }
    }
}

impl<A, T, E> Throttled<A, T, E> {
    /// Whether a trailing call is queued.
    pub fn is_pending(&self) -> bool {
        self.scheduler.lock().pending.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn cancelled<E>() -> AsyncError<E> {
    AsyncError::Cancelled(THROTTLE_CANCELLED.to_string())
}

/// Throttle `f` to one run per `interval`.
pub fn throttle_async<A, T, E, F, Fut>(
    f: F,
    interval: Duration,
    options: ThrottleOptions,
) -> Throttled<A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let call: BoxedCall<A, T, E> = Box::new(move |args: A| f(args).boxed());
    Throttled {
        scheduler: Arc::new(Scheduler::new(call)),
        interval,
        options,
    }
}
