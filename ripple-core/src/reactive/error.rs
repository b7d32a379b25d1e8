//! Errors raised by the reactive primitives.

use thiserror::Error;

/// Misuse of a reactive primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write was attempted on a computed value.
    #[error("computed signals are read-only")]
    ReadOnlyComputed,
}
