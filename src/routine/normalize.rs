//! Turning yielded values into pending results.
//!
//! [`normalize`] is the single entry point that maps every [`Yielded`] shape
//! onto a [`Pending`]. The driver goes through [`step_target`], which applies
//! one extra rule: suspending on a non-empty plain value is a protocol error,
//! reported with the offending value's rendered form.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use crate::error::FlowError;
use crate::pending::{Completer, Pending};

use super::driver::run_boxed;
use super::Yielded;

/// A continuation-style function: receives one completion [`Callback`] and
/// arranges for it to be invoked when the work finishes.
pub type Thunk = Box<dyn FnOnce(Callback) + Send>;

/// The completion callback handed to a [`Thunk`].
///
/// Node-style shape: `complete(error, results)`. The first invocation settles
/// the linked pending result; every later invocation is silently ignored. The
/// handle is cheap to clone, so external code may capture it in several
/// places without weakening the exactly-once guarantee.
#[derive(Clone, Debug)]
pub struct Callback {
    completer: Arc<Completer>,
}

impl Callback {
    fn new(completer: Completer) -> Self {
        Self {
            completer: Arc::new(completer),
        }
    }

    /// Completes with `(error, results)`.
    ///
    /// A present `error` rejects. Otherwise zero results resolve to
    /// [`Value::Null`], a single result resolves to that value, and several
    /// results resolve to an ordered list.
    pub fn complete(&self, error: Option<FlowError>, mut results: Vec<Value>) {
        if let Some(error) = error {
            self.completer.fail(error);
            return;
        }
        let value = match results.len() {
            0 => Value::Null,
            1 => results.remove(0),
            _ => Value::Array(results),
        };
        self.completer.succeed(value);
    }

    /// Completes successfully with a single value.
    pub fn resolve(&self, value: impl Into<Value>) {
        self.complete(None, vec![value.into()]);
    }

    /// Completes with a failure.
    pub fn reject(&self, error: FlowError) {
        self.complete(Some(error), Vec::new());
    }
}

/// Normalizes a yielded value into a single pending result.
///
/// Plain values — including empty ones — resolve trivially here; the stricter
/// plain-value rule applies only on the driver's step path ([`step_target`]).
pub fn normalize(yielded: Yielded) -> Pending {
    match yielded {
        Yielded::Pending(pending) => pending,
        Yielded::Value(value) => Pending::ok(value),
        Yielded::Routine(routine) => run_boxed(routine),
        Yielded::Callback(thunk) => {
            let (completer, pending) = Pending::channel();
            thunk(Callback::new(completer));
            pending
        }
        Yielded::List(items) => normalize_list(items),
        Yielded::Map(entries) => normalize_map(entries),
    }
}

/// The driver-facing variant of [`normalize`].
///
/// Empty plain values resume the routine as-is; any other plain value is
/// rejected with [`FlowError::UnsupportedYield`] naming its rendered form, so
/// the routine gets a chance to intercept the mistake via `raise`.
pub(crate) fn step_target(yielded: Yielded) -> Result<Pending, FlowError> {
    match yielded {
        Yielded::Value(value) if is_empty(&value) => Ok(Pending::ok(value)),
        Yielded::Value(value) => Err(FlowError::UnsupportedYield(value.to_string())),
        other => Ok(normalize(other)),
    }
}

// The empty values: null, false, zero, "".
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn normalize_list(items: Vec<Yielded>) -> Pending {
    let pendings: Vec<Pending> = items.into_iter().map(normalize).collect();
    Pending::from_future(async move {
        let values = try_join_all(pendings).await?;
        Ok(Value::Array(values))
    })
}

fn normalize_map(entries: Vec<(String, Yielded)>) -> Pending {
    let mut shaped = serde_json::Map::new();
    let mut keys = Vec::new();
    let mut pendings = Vec::new();
    for (key, yielded) in entries {
        match yielded {
            // literal entries keep their place without being awaited
            Yielded::Value(value) => {
                shaped.insert(key, value);
            }
            other => {
                shaped.insert(key.clone(), Value::Null);
                keys.push(key);
                pendings.push(normalize(other));
            }
        }
    }
    Pending::from_future(async move {
        let values = try_join_all(pendings).await?;
        for (key, value) in keys.into_iter().zip(values) {
            shaped.insert(key, value);
        }
        Ok(Value::Object(shaped))
    })
}
