//! # lamina
//!
//! A coroutine-driven middleware execution kernel for async Rust web stacks.
//!
//! lamina is the control-flow core a web framework is built on, without the
//! framework: it sequences asynchronous steps with exactly-once forward
//! progress and deterministic error propagation, three ways —
//!
//! - **Routines** ([`routine`]) — drive a suspendable computation step by
//!   step, normalizing whatever it yields (pending results, callbacks, nested
//!   routines, lists, maps) into one awaitable per step.
//! - **Chains** ([`chain`]) — compose ordered middleware over a shared
//!   context, with a reentrancy guard that surfaces duplicate continuation
//!   calls instead of executing them.
//! - **Stacks** ([`stack`]) — walk prefix-gated layers over a mutable
//!   request, stripping and exactly restoring matched path prefixes, routing
//!   normal and error flow to layers by their registered kind.
//!
//! Transport I/O, route patterns beyond literal prefixes, and response
//! serialization are out of scope; an adapter hands in a [`Request`] and a
//! response sink of its choosing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lamina::{Control, Request, Stack};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app: Stack<Vec<String>> = Stack::new();
//!     app.mount("/api", |req, res| {
//!         Box::pin(async move {
//!             res.push(format!("hit {}", req.url()));
//!             Control::Next
//!         })
//!     });
//!
//!     let mut req = Request::new("GET", "/api/users");
//!     let mut res = Vec::new();
//!     app.handle(&mut req, &mut res, |error, _req, _res| {
//!         if let Some(error) = error {
//!             eprintln!("unhandled: {error}");
//!         }
//!     })
//!     .await;
//! }
//! ```

pub mod chain;
pub mod error;
pub mod pending;
pub mod routine;
pub mod stack;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use chain::{unit, Chain, Next, Unit};
pub use error::FlowError;
pub use pending::{Completer, Outcome, Pending};
pub use routine::{normalize, run, spawn, wrap, Callback, Routine, Spawned, Step, Thunk, Yielded};
pub use stack::{Control, ErrorHandler, Extensions, Handler, Headers, Request, Stack};

/// The dynamic step-value currency, re-exported from `serde_json`.
pub use serde_json::Value;
