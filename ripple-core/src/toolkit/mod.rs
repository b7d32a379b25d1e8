//! Async Toolkit
//!
//! Control-flow helpers for async code running on tokio: resilience
//! (retry, timeouts), concurrency shaping (parallel, sequential, race) and
//! call-rate shaping (debounce, throttle).
//!
//! # Cancellation
//!
//! Cancelling an operation here only ever means that the caller stops
//! waiting for it. [`sleep`] and the delay between [`retry`] attempts stop
//! as soon as their [`AbortSignal`] fires; [`timeout`] drops the future it
//! gave up on. Work that has been handed off elsewhere keeps running unless
//! it checks a signal itself.
//!
//! # Errors
//!
//! Functions that run caller-supplied work return [`AsyncError<E>`], where
//! `E` is the caller's own error type. The caller's error is never replaced,
//! only wrapped.
//!
//! # Configuration
//!
//! The option structs ([`RetryOptions`], [`ParallelOptions`],
//! [`DebounceOptions`], [`ThrottleOptions`]) implement serde traits, with
//! durations written as whole milliseconds. Callbacks such as
//! `should_retry` are set in code.

mod abort;
mod concurrency;
mod config;
mod debounce;
mod error;
mod race;
mod retry;
mod schedule;
mod throttle;
mod time;

pub use abort::{AbortController, AbortSignal};
pub use concurrency::{parallel, sequential, sequential_settled, ParallelOptions};
pub use debounce::{debounce_async, DebounceOptions, Debounced};
pub use error::{AbortError, AsyncError, TimeoutError, DEBOUNCE_CANCELLED, THROTTLE_CANCELLED};
pub use race::{all_settled, race, Fulfilled, Rejected, Settled};
pub use retry::{retry, Backoff, RetryOptions, ShouldRetry};
pub use throttle::{throttle_async, ThrottleOptions, Throttled};
pub use time::{sleep, timeout, with_timeout, WithTimeout};
