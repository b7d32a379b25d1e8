//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects and batching.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. A change upstream
//! marks it dirty and notifies its own dependents immediately, but the value
//! is only recomputed when someone reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems. An effect may return a [`Cleanup`] that runs before the
//! next run and on disposal.
//!
//! ## Batches
//!
//! [`batch`] defers notifications until its body returns, so a subscriber
//! affected by several writes hears about them once. Every computed affected
//! by the batch is dirty before the first effect runs, so no effect sees a
//! mix of old and new values. A write outside a batch behaves like a batch
//! of one.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency. Subscriber sets are
//! keyed by [`SubscriberId`], not by owning references, so the graph holds no
//! strong back-pointers from sources to computeds.

mod context;
mod computed;
mod effect;
mod error;
mod runtime;
mod signal;
mod subscriber;

pub use computed::{computed, Computed};
pub use context::{untracked, ReactiveContext};
pub use effect::{effect, Cleanup, Effect, IntoCleanup};
pub use error::ReactiveError;
pub use runtime::{batch, is_batching, Runtime};
pub use signal::{signal, EqualsFn, Signal, SignalLike, Subscription};
pub use subscriber::{Subscriber, SubscriberId};
