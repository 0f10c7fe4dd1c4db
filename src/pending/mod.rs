//! Single-resolution pending results.
//!
//! A [`Pending`] represents an eventual success or failure: the one currency
//! every part of the kernel settles in. A [`Completer`] is the write side —
//! it settles its `Pending` exactly once, and later settlement attempts are
//! ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::FlowError;

/// The settled form of a [`Pending`]: a success [`Value`] or a [`FlowError`].
pub type Outcome = Result<Value, FlowError>;

/// A pending result: a future that settles exactly once with an [`Outcome`].
///
/// `Pending` is deliberately opaque — it may be already settled, backed by a
/// [`Completer`] channel, or wrap an arbitrary future. Awaiting it is the only
/// way to observe the outcome.
///
/// # Examples
///
/// ```rust,no_run
/// use lamina::{Pending, Value};
///
/// # async fn demo() {
/// let pending = Pending::ok("ready");
/// assert_eq!(pending.await, Ok(Value::from("ready")));
/// # }
/// ```
pub struct Pending {
    inner: Pin<Box<dyn Future<Output = Outcome> + Send>>,
}

impl Pending {
    /// Creates an already-settled pending result.
    pub fn ready(outcome: Outcome) -> Self {
        Self {
            inner: Box::pin(std::future::ready(outcome)),
        }
    }

    /// Creates an already-succeeded pending result.
    pub fn ok(value: impl Into<Value>) -> Self {
        Self::ready(Ok(value.into()))
    }

    /// Creates an already-failed pending result.
    pub fn err(error: FlowError) -> Self {
        Self::ready(Err(error))
    }

    /// Wraps an arbitrary future as a pending result.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            inner: Box::pin(future),
        }
    }

    /// Creates a linked [`Completer`]/[`Pending`] pair.
    ///
    /// The pending result settles when the completer is first settled. If the
    /// completer is dropped unsettled, the pending result fails with
    /// [`FlowError::DroppedCallback`] rather than hanging forever.
    pub fn channel() -> (Completer, Pending) {
        let (tx, rx) = oneshot::channel();
        let completer = Completer {
            tx: Mutex::new(Some(tx)),
        };
        let pending = Self {
            inner: Box::pin(async move {
                rx.await.unwrap_or(Err(FlowError::DroppedCallback))
            }),
        };
        (completer, pending)
    }
}

impl Future for Pending {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pending")
    }
}

/// The write side of a [`Pending::channel`] pair.
///
/// Exactly one of [`succeed`](Self::succeed) / [`fail`](Self::fail) takes
/// effect per instance; every later settlement attempt is ignored and reported
/// by the `bool` return.
pub struct Completer {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Completer {
    /// Settles the linked pending result. Returns `false` if it was already
    /// settled.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let Ok(mut slot) = self.tx.lock() else {
            return false;
        };
        match slot.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Settles with a success value. Returns `false` if already settled.
    pub fn succeed(&self, value: impl Into<Value>) -> bool {
        self.settle(Ok(value.into()))
    }

    /// Settles with a failure. Returns `false` if already settled.
    pub fn fail(&self, error: FlowError) -> bool {
        self.settle(Err(error))
    }

    /// Returns `true` once a settlement has been consumed.
    pub fn is_settled(&self) -> bool {
        self.tx.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("settled", &self.is_settled())
            .finish()
    }
}
