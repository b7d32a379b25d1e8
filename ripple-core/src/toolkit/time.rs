//! Timers: cancellable sleep and timeouts.

use std::future::Future;
use std::time::Duration;

use super::abort::AbortSignal;
use super::error::{AbortError, TimeoutError};

/// Wait for `duration`, or until `signal` aborts.
///
/// Fails immediately if the signal is already aborted. A zero duration
/// returns without touching the timer. Whichever side loses the race is
/// dropped, so neither the timer nor the abort listener outlives the call.
pub async fn sleep(duration: Duration, signal: Option<&AbortSignal>) -> Result<(), AbortError> {
    if let Some(signal) = signal {
        signal.check()?;
    }

    if duration.is_zero() {
        return Ok(());
    }

    let Some(signal) = signal else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = signal.aborted() => {
            tracing::debug!(duration_ms = duration.as_millis() as u64, "sleep aborted");
            Err(AbortError)
        }
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Await `future` for at most `duration`.
///
/// On expiry the future is dropped and a [`TimeoutError`] carrying the limit
/// is returned. Dropping only stops waiting: work the future already handed
/// off elsewhere (a spawned task, a remote call) keeps going unless it
/// watches its own [`AbortSignal`].
pub async fn timeout<F>(
    future: F,
    duration: Duration,
    message: Option<String>,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(duration, future).await.map_err(|_| {
        tracing::debug!(timeout_ms = duration.as_millis() as u64, "operation timed out");
        TimeoutError::new(duration, message)
    })
}

/// A function wrapped so every call is bounded by a timeout.
///
/// Built by [`with_timeout`]. Arguments are passed through unchanged; use a
/// tuple for several arguments and `()` for none.
#[derive(Debug, Clone)]
pub struct WithTimeout<F> {
    f: F,
    duration: Duration,
    message: Option<String>,
}

impl<F> WithTimeout<F> {
    pub fn call<A, Fut>(&self, args: A) -> impl Future<Output = Result<Fut::Output, TimeoutError>>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        timeout((self.f)(args), self.duration, self.message.clone())
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Wrap `f` so that each call applies [`timeout`] with the same limit.
pub fn with_timeout<F>(f: F, duration: Duration, message: Option<String>) -> WithTimeout<F> {
    WithTimeout {
        f,
        duration,
        message,
    }
}
