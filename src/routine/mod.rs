//! Routines — suspendable computations driven one step at a time.
//!
//! A [`Routine`] is the kernel's coroutine: an opaque state machine the
//! [driver](crate::routine::run) resumes repeatedly until it reports
//! [`Step::Done`]. At each suspension point the routine yields a [`Yielded`]
//! value, which the [normalizer](crate::routine::normalize) turns into a
//! single [`Pending`] to await before the next resume.
//!
//! ## Core types
//!
//! - [`Routine`] — trait implemented by all steppable computations.
//! - [`Step`] — one resume's result: suspend on a value, or finish.
//! - [`Yielded`] — the tagged union of awaitable shapes.
//! - [`run`] / [`spawn`] / [`wrap`] — drivers that expose a routine's whole
//!   lifetime as one [`Pending`].

mod driver;
mod normalize;

use serde_json::Value;

use crate::error::FlowError;
use crate::pending::Pending;

pub use driver::{run, spawn, wrap, Spawned};
pub use normalize::{normalize, Callback, Thunk};

/// The result of resuming a routine once.
pub enum Step {
    /// Suspend on the yielded value; the routine is resumed with whatever it
    /// settles to.
    Yield(Yielded),
    /// The routine finished with this value.
    Done(Value),
}

/// A value yielded at a suspension point.
///
/// The tag decides how the normalizer awaits it: pending results pass through,
/// callbacks are wrapped, nested routines are driven recursively, lists and
/// maps are joined element-wise, and plain values resolve trivially (the
/// driver additionally rejects non-empty plain values, since suspending on
/// them is almost always a bug).
pub enum Yielded {
    /// An already-created pending result.
    Pending(Pending),
    /// A continuation-style function that is handed a completion [`Callback`].
    Callback(Thunk),
    /// A nested routine, driven to completion for its final value.
    Routine(Box<dyn Routine>),
    /// An ordered list of yieldables, joined fail-fast with order preserved.
    List(Vec<Yielded>),
    /// Keyed yieldables, joined into a same-shaped map; plain values are kept
    /// as literal entries.
    Map(Vec<(String, Yielded)>),
    /// A plain value.
    Value(Value),
}

impl Yielded {
    /// Wraps a plain value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Wraps a continuation-style function.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Callback) + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Wraps a nested routine.
    pub fn routine(routine: impl Routine + 'static) -> Self {
        Self::Routine(Box::new(routine))
    }
}

impl From<Pending> for Yielded {
    fn from(pending: Pending) -> Self {
        Self::Pending(pending)
    }
}

impl From<Value> for Yielded {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A suspendable computation advanced one step at a time by the driver.
///
/// Implementors are explicit state machines: each [`advance`](Self::advance)
/// consumes the previous step's settled value and either yields the next
/// awaitable or finishes. The driver owns the routine exclusively while
/// running it and never resumes it concurrently.
///
/// Errors follow one channel: returning `Err` from either method fails the
/// whole run. [`raise`](Self::raise) is the routine's chance to intercept a
/// failed step and recover; the default implementation rethrows, matching a
/// routine with no internal error handling.
pub trait Routine: Send {
    /// Resumes the routine with the previous step's settled value.
    ///
    /// The first resume passes [`Value::Null`], since no step has settled yet.
    fn advance(&mut self, input: Value) -> Result<Step, FlowError>;

    /// Injects a failed step into the routine.
    ///
    /// Returning `Ok` recovers: the run continues with the returned step,
    /// indistinguishable downstream from a value-producing resume.
    fn raise(&mut self, error: FlowError) -> Result<Step, FlowError> {
        Err(error)
    }
}
