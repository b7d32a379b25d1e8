//! Debounced async functions.
//!
//! A [`Debounced`] holds at most one pending call. Each new call supersedes
//! the previous pending one, which is rejected right away with
//! [`DEBOUNCE_CANCELLED`] rather than when the new call's timer fires. Only
//! the latest caller ever sees the wrapped function's result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::{AsyncError, DEBOUNCE_CANCELLED};
use super::schedule::{BoxedCall, Scheduler};

/// Edge selection for [`debounce_async`].
///
/// `trailing` left unset means the opposite of `leading`, so
/// `{"leading": true}` in configuration is a leading-only debounce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceOptions {
    /// Run immediately when no call has run within the delay.
    pub leading: bool,
    /// Run the latest call once the delay passes without another call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing: Option<bool>,
}

impl DebounceOptions {
    /// Leading edge only: a call runs at once or is refused.
    pub fn leading_edge() -> Self {
        Self {
            leading: true,
            trailing: None,
        }
    }

    /// Whether the trailing edge runs, after resolving the default.
    pub fn runs_trailing(&self) -> bool {
        self.trailing.unwrap_or(!self.leading)
    }
}

/// An async function whose calls are debounced. Cloning shares the state.
pub struct Debounced<A, T, E> {
    scheduler: Arc<Scheduler<A, T, E>>,
    delay: Duration,
    options: DebounceOptions,
}

impl<A, T, E> Clone for Debounced<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            delay: self.delay,
            options: self.options,
        }
    }
}

impl<A, T, E> std::fmt::Debug for Debounced<A, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .field("options", &self.options)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<A, T, E> Debounced<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Schedule a call with `args`.
    ///
    /// The returned future resolves with the function's result if this call
    /// is the one that runs, or with [`AsyncError::Cancelled`] if a later
    /// call, [`cancel`](Self::cancel), or a refused leading-only call gets
    /// there first. Must be called within a tokio runtime.
    pub fn call(&self, args: A) -> BoxFuture<'static, Result<T, AsyncError<E>>> {
        let mut slot = self.scheduler.lock();

        if let Some(superseded) = slot.clear() {
            tracing::trace!("debounced call superseded");
            superseded.reject(DEBOUNCE_CANCELLED);
        }

        let now = Instant::now();
        let quiet = slot
            .last_invoke
            .map_or(true, |last| now.duration_since(last) >= self.delay);

        if self.options.leading && quiet {
            slot.last_invoke = Some(now);
            drop(slot);
            let running = self.scheduler.run_now(args);
            return async move { running.await.map_err(AsyncError::Failed) }.boxed();
        }

        if !self.options.runs_trailing() {
            return async { Err::<T, AsyncError<E>>(cancelled()) }.boxed();
        }

        let (receiver, _) = slot.park(args);
        self.scheduler.arm(&mut slot, now + self.delay);

        async move { receiver.await.unwrap_or_else(|_| Err(cancelled())) }.boxed()
    }

    /// Run the pending call now instead of waiting for its timer.
    ///
    /// The result goes to the caller that is waiting on that call. Does
    /// nothing when no call is pending.
    pub async fn flush(&self) {
        let pending = {
            let mut slot = self.scheduler.lock();
            let pending = slot.clear();
            if pending.is_some() {
                slot.last_invoke = Some(Instant::now());
            }
            pending
        };

        if let Some(pending) = pending {
            tracing::trace!("debounced call flushed");
            self.scheduler.invoke(pending).await;
        }
    }

    /// Drop the pending call, rejecting its caller.
    pub fn cancel(&self) {
        let pending = self.scheduler.lock().clear();
        if let Some(pending) = pending {
            tracing::trace!("debounced call cancelled");
            pending.reject(DEBOUNCE_CANCELLED);
        }
    }
}

impl<A, T, E> Debounced<A, T, E> {
    pub fn is_pending(&self) -> bool {
        self.scheduler.lock().pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

fn cancelled<E>() -> AsyncError<E> {
    AsyncError::Cancelled(DEBOUNCE_CANCELLED.to_string())
}

/// Debounce `f` by `delay`.
///
/// With the default options only the trailing edge runs: the latest call
/// runs once `delay` has passed without another call.
pub fn debounce_async<A, T, E, F, Fut>(
    f: F,
    delay: Duration,
    options: DebounceOptions,
) -> Debounced<A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let call: BoxedCall<A, T, E> = Box::new(move |args: A| f(args).boxed());
    Debounced {
        scheduler: Arc::new(Scheduler::new(call)),
        delay,
        options,
    }
}
