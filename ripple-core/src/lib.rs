//! Ripple Core
//!
//! This crate provides two independent building blocks:
//!
//! - Reactive primitives (signals, computeds, effects, batching) with
//!   automatic dependency tracking
//! - An async toolkit for tokio (retry, timeouts, bounded parallelism,
//!   race, debounce and throttle) with explicit cancellation
//!
//! Neither depends on the other. The toolkit is typically used around I/O
//! such as HTTP requests; the reactive core holds the state derived from it.
//!
//! # Architecture
//!
//! - `reactive`: signals, derived values, effects and the tracking context
//! - `toolkit`: async control-flow helpers and their error types
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{batch, computed, effect, signal};
//!
//! let a = signal(1);
//! let b = signal(2);
//!
//! let sum = {
//!     let (a, b) = (a.clone(), b.clone());
//!     computed(move || a.get() + b.get())
//! };
//!
//! let watcher = {
//!     let sum = sum.clone();
//!     effect(move || println!("sum = {}", sum.get()))
//! };
//!
//! // One notification for both writes.
//! batch(|| {
//!     a.set(5);
//!     b.set(10);
//! });
//! assert_eq!(sum.get(), 15);
//!
//! watcher.dispose();
//! ```

pub mod reactive;
pub mod toolkit;

pub use reactive::{batch, computed, effect, signal, untracked, Computed, Effect, Signal};
pub use toolkit::{AbortController, AbortSignal, AsyncError};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
