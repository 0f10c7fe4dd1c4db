//! The crate-wide error type.
//!
//! Every failure in the kernel — a routine yielding something unawaitable, a
//! chain continuation invoked twice, a handler raising — travels through
//! [`FlowError`]. Success and failure share one channel ([`crate::Outcome`]),
//! so an error recovered mid-flight is indistinguishable downstream from a
//! value-producing step.

use thiserror::Error;

/// Errors produced while driving routines, chains, and dispatch stacks.
///
/// The first three variants are protocol violations: caller bugs that are
/// surfaced as failures rather than swallowed, because ignoring them would
/// mean duplicated side effects or silent hangs. [`FlowError::Raised`] carries
/// ordinary application errors raised by handlers and middleware.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A routine yielded a plain value the driver cannot await.
    #[error(
        "you may only yield a pending result, callback, routine, list, or map, \
         but \"{0}\" was yielded"
    )]
    UnsupportedYield(String),

    /// A chain continuation was invoked again at the same or an earlier
    /// position.
    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    /// A completion callback was dropped without ever being invoked, so its
    /// pending result can never settle.
    #[error("completion callback dropped before being invoked")]
    DroppedCallback,

    /// An error raised by a handler or middleware unit.
    #[error("{0}")]
    Raised(String),
}

impl FlowError {
    /// Creates a handler-raised error from any message.
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised(message.into())
    }
}
