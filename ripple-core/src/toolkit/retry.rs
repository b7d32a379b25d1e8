//! Retry with backoff.
//!
//! [`retry`] calls an async operation until it succeeds, the attempt budget
//! runs out, a `should_retry` predicate refuses the error, or the abort
//! signal fires during a delay. Each outcome surfaces as a different
//! [`AsyncError`] variant so callers can tell them apart.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::abort::AbortSignal;
use super::config::{duration_ms, option_duration_ms};
use super::error::AsyncError;
use super::time::sleep;

/// Delay schedule between attempts. Attempts are numbered from 1.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// Caller-supplied delay per attempt. Not serializable.
    #[serde(skip)]
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Uncapped delay after the given failed attempt.
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Linear => base.checked_mul(attempt).unwrap_or(Duration::MAX),
            Self::Exponential => 2u32
                .checked_pow(attempt.saturating_sub(1))
                .and_then(|factor| base.checked_mul(factor))
                .unwrap_or(Duration::MAX),
            Self::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("Linear"),
            Self::Exponential => f.write_str("Exponential"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Predicate deciding whether an error is worth another attempt.
pub type ShouldRetry<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Options for [`retry`].
///
/// The numeric fields can be loaded from configuration (durations in
/// milliseconds); the predicate and abort signal are runtime-only.
#[derive(Serialize, Deserialize)]
#[serde(default, bound = "")]
pub struct RetryOptions<E> {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound on any single delay. `None` means unbounded.
    #[serde(with = "option_duration_ms")]
    pub max_delay: Option<Duration>,
    pub backoff: Backoff,
    #[serde(skip)]
    pub should_retry: Option<ShouldRetry<E>>,
    #[serde(skip)]
    pub signal: Option<AbortSignal>,
}

impl<E> RetryOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Delay to wait after `attempt` failed, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay(self.base_delay, attempt);
        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }

    fn validate(&self) -> Result<(), AsyncError<E>> {
        if self.max_attempts == 0 {
            return Err(AsyncError::invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }

    fn permits_retry(&self, error: &E) -> bool {
        self.should_retry
            .as_ref()
            .map_or(true, |should_retry| should_retry(error))
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: None,
            backoff: Backoff::Exponential,
            should_retry: None,
            signal: None,
        }
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            backoff: self.backoff.clone(),
            should_retry: self.should_retry.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .field("should_retry", &self.should_retry.is_some())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Run `operation` until it succeeds, retrying failures with backoff.
///
/// - Success returns immediately.
/// - An error refused by `should_retry` is returned as
///   [`AsyncError::Failed`] without further attempts.
/// - After the final attempt fails, returns [`AsyncError::RetryExhausted`]
///   holding that attempt's error. No delay follows the final attempt.
/// - An abort during a delay returns [`AsyncError::Aborted`].
///
/// ```rust,ignore
/// let body = retry(
///     || client.fetch(url),
///     RetryOptions::new().max_attempts(5).base_delay(Duration::from_millis(200)),
/// )
/// .await?;
/// ```
pub async fn retry<T, E, F, Fut>(
    mut operation: F,
    options: RetryOptions<E>,
) -> Result<T, AsyncError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    options.validate()?;

    let mut attempt = 1;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !options.permits_retry(&error) {
            tracing::debug!(attempt, "error is not retryable");
            return Err(AsyncError::Failed(error));
        }

        if attempt >= options.max_attempts {
            tracing::debug!(attempts = attempt, "retry attempts exhausted");
            return Err(AsyncError::RetryExhausted {
                attempts: options.max_attempts,
                last_error: error,
            });
        }

        let delay = options.delay_for(attempt);
        tracing::debug!(
            attempt,
            max_attempts = options.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, retrying"
        );
        sleep(delay, options.signal.as_ref()).await?;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::AbortController;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn linear_and_exponential_schedules() {
        let base = ms(100);
        assert_eq!(Backoff::Linear.delay(base, 1), ms(100));
        assert_eq!(Backoff::Linear.delay(base, 3), ms(300));
        assert_eq!(Backoff::Exponential.delay(base, 1), ms(100));
        assert_eq!(Backoff::Exponential.delay(base, 4), ms(800));
        assert_eq!(Backoff::Exponential.delay(base, 200), Duration::MAX);

        let custom = Backoff::custom(|attempt| ms(u64::from(attempt) * 7));
        assert_eq!(custom.delay(base, 2), ms(14));
    }

    #[test]
    fn delay_is_capped() {
        let options: RetryOptions<()> = RetryOptions::new().base_delay(ms(100)).max_delay(ms(250));
        assert_eq!(options.delay_for(1), ms(100));
        assert_eq!(options.delay_for(2), ms(200));
        assert_eq!(options.delay_for(3), ms(250));
    }

    #[test]
    fn options_load_from_json() {
        let json = r#"{"max_attempts": 5, "base_delay": 20, "backoff": "linear"}"#;
        let options: RetryOptions<String> = serde_json::from_str(json).unwrap();

        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.base_delay, ms(20));
        assert_eq!(options.max_delay, None);
        assert!(matches!(options.backoff, Backoff::Linear));
        assert!(options.should_retry.is_none());

        let defaults: RetryOptions<String> = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults.max_attempts, 3);
        assert_eq!(defaults.base_delay, ms(1000));
        assert!(matches!(defaults.backoff, Backoff::Exponential));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, AsyncError<&str>> = retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 { Err("flaky") } else { Ok(n) }
            },
            RetryOptions::new().base_delay(ms(10)),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(String::from("x"))
            },
            RetryOptions::new().max_attempts(3).base_delay(Duration::ZERO),
        )
        .await;

        match result {
            Err(AsyncError::RetryExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "x");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_error_is_returned_unwrapped() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(String::from("fatal"))
            },
            RetryOptions::new().should_retry(|error: &String| error != "fatal"),
        )
        .await;

        assert!(matches!(result, Err(AsyncError::Failed(ref e)) if e == "fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts_only() {
        let start = Instant::now();
        let result: Result<(), _> = retry(
            || async { Err::<(), _>("nope") },
            RetryOptions::new().max_attempts(3).base_delay(ms(100)),
        )
        .await;

        assert!(result.is_err());
        // 100ms after the first failure, 200ms after the second, none after the third.
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(300) && elapsed < ms(400), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_during_delay_is_distinct_from_exhaustion() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let aborter = tokio::spawn(async move {
            tokio::time::sleep(ms(50)).await;
            controller.abort();
        });

        let result: Result<(), _> = retry(
            || async { Err::<(), _>("down") },
            RetryOptions::new().max_attempts(5).base_delay(ms(1000)).signal(signal),
        )
        .await;

        assert!(matches!(result, Err(AsyncError::Aborted(_))));
        aborter.await.unwrap();
    }

    #[tokio::test]
    async fn zero_attempts_is_rejected_up_front() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), AsyncError<()>> = retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            RetryOptions::new().max_attempts(0),
        )
        .await;

        assert!(matches!(result, Err(AsyncError::InvalidArgument(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
