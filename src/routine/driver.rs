//! The routine driver.
//!
//! [`run`] resumes a routine step by step until it finishes, awaiting each
//! yielded value through the normalizer and feeding the settlement back in.
//! The whole run is exposed as one outer [`Pending`] — one future per routine
//! lifetime, never a per-step chain, so long-running routines do not
//! accumulate intermediate results.

use serde_json::Value;

use crate::error::FlowError;
use crate::pending::{Outcome, Pending};

use super::normalize::step_target;
use super::{Routine, Step};

/// What a routine factory may produce.
pub enum Spawned {
    /// A routine to drive to completion.
    Routine(Box<dyn Routine>),
    /// A plain value — the run resolves with it immediately.
    Value(Value),
}

impl Spawned {
    /// Wraps a routine.
    pub fn routine(routine: impl Routine + 'static) -> Self {
        Self::Routine(Box::new(routine))
    }

    /// Wraps a plain value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// Drives `routine` to completion, exposing its lifetime as one [`Pending`].
pub fn run(routine: impl Routine + 'static) -> Pending {
    run_boxed(Box::new(routine))
}

pub(crate) fn run_boxed(routine: Box<dyn Routine>) -> Pending {
    Pending::from_future(drive(routine))
}

/// Invokes `factory` with `args` and drives the result.
///
/// A factory returning [`Spawned::Value`] resolves the run immediately with
/// that value, without any stepping.
pub fn spawn<F>(factory: F, args: Vec<Value>) -> Pending
where
    F: FnOnce(Vec<Value>) -> Spawned,
{
    match factory(args) {
        Spawned::Routine(routine) => run_boxed(routine),
        Spawned::Value(value) => Pending::ok(value),
    }
}

/// Adapts a routine factory into a reusable launcher.
///
/// Each call invokes the factory afresh and returns a new [`Pending`] for
/// that run, for handing to code that expects an ordinary async function.
pub fn wrap<F>(factory: F) -> impl Fn(Vec<Value>) -> Pending
where
    F: Fn(Vec<Value>) -> Spawned,
{
    move |args| match factory(args) {
        Spawned::Routine(routine) => run_boxed(routine),
        Spawned::Value(value) => Pending::ok(value),
    }
}

// How the next resume re-enters the routine.
enum Resume {
    Value(Value),
    Error(FlowError),
}

async fn drive(mut routine: Box<dyn Routine>) -> Outcome {
    let mut resume = Resume::Value(Value::Null);
    loop {
        // A construct that throws out of advance/raise ends the run.
        let step = match resume {
            Resume::Value(value) => routine.advance(value)?,
            Resume::Error(error) => routine.raise(error)?,
        };
        let yielded = match step {
            Step::Done(value) => return Ok(value),
            Step::Yield(yielded) => yielded,
        };
        resume = match step_target(yielded) {
            Ok(pending) => match pending.await {
                Ok(value) => Resume::Value(value),
                Err(error) => Resume::Error(error),
            },
            // unsupported yield: the routine may still intercept it
            Err(error) => Resume::Error(error),
        };
    }
}
