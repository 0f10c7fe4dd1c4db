//! Middleware composition over a shared context.
//!
//! A [`Chain`] takes an ordered list of middleware [`Unit`]s and behaves as
//! one callable: each unit receives the context plus a [`Next`] continuation
//! and decides whether to pass control on, short-circuit, or fail. Every
//! invocation settles as a single [`Pending`].
//!
//! A per-invocation cursor guards forward progress: invoking a continuation
//! for a position at or before the last dispatched one is surfaced as
//! [`FlowError::NextCalledMultipleTimes`] instead of being executed, because a
//! duplicate dispatch would mean duplicated side effects.
//!
//! ## Core types
//!
//! - [`Unit`] — type-erased, cheaply-cloneable middleware function.
//! - [`unit`] — wraps a closure into a [`Unit`].
//! - [`Next`] — the guarded continuation handed to each unit.
//! - [`Chain`] — the composed stack.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::FlowError;
use crate::pending::Pending;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in a [`Chain`] is stored as a `Unit`. The [`Arc`] wrapper makes
/// units cheap to clone so the chain can hand them to continuations without
/// copying closures. The element type is the construction-time validity check:
/// only callables of this shape can enter a chain.
pub type Unit<C> = Arc<dyn Fn(C, Next<C>) -> Pending + Send + Sync>;

/// Wraps a closure into a [`Unit`].
pub fn unit<C, F>(f: F) -> Unit<C>
where
    C: 'static,
    F: Fn(C, Next<C>) -> Pending + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An ordered middleware chain composed into one callable.
///
/// Units run strictly in list order. A unit that never invokes its
/// continuation halts the chain — later units simply never run, and the
/// invocation settles with whatever that unit produced.
///
/// # Examples
///
/// ```rust,no_run
/// use lamina::{unit, Chain};
///
/// # async fn demo() {
/// let chain: Chain<u32> = Chain::new(vec![
///     unit(|n, next| next.run(n + 1)),
///     unit(|n, _next| lamina::Pending::ok(n)),
/// ]);
/// let outcome = chain.call(1, None).await;
/// # }
/// ```
pub struct Chain<C> {
    units: Arc<[Unit<C>]>,
}

impl<C> Clone for Chain<C> {
    fn clone(&self) -> Self {
        Self {
            units: Arc::clone(&self.units),
        }
    }
}

impl<C> Default for Chain<C> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<C> Chain<C> {
    /// Composes `units` into a chain.
    pub fn new(units: Vec<Unit<C>>) -> Self {
        Self {
            units: units.into(),
        }
    }

    /// Returns the number of composed units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the chain holds no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Invokes the chain over `ctx`.
    ///
    /// When the last unit passes control on, dispatch falls back to
    /// `terminal`; with no terminal, the invocation resolves with
    /// [`Value::Null`] (an empty chain completes successfully).
    pub fn call(&self, ctx: C, terminal: Option<Unit<C>>) -> Pending {
        dispatch(
            Arc::clone(&self.units),
            terminal,
            Arc::new(AtomicI64::new(-1)),
            0,
            ctx,
        )
    }
}

impl<C: 'static> Chain<C> {
    /// Re-shapes the chain as a single [`Unit`], so it can be embedded in an
    /// outer chain. The outer continuation serves as this chain's terminal.
    pub fn to_unit(&self) -> Unit<C> {
        let units = Arc::clone(&self.units);
        Arc::new(move |ctx, next| {
            let terminal: Unit<C> = Arc::new(move |ctx, _next| next.run(ctx));
            dispatch(
                Arc::clone(&units),
                Some(terminal),
                Arc::new(AtomicI64::new(-1)),
                0,
                ctx,
            )
        })
    }
}

/// A guarded continuation into the remaining chain.
///
/// Handed to each unit; [`run`](Self::run) dispatches the next position.
/// Cloning is cheap, but every clone shares the same cursor: running any of
/// them more than once per position fails with
/// [`FlowError::NextCalledMultipleTimes`].
pub struct Next<C> {
    units: Arc<[Unit<C>]>,
    terminal: Option<Unit<C>>,
    cursor: Arc<AtomicI64>,
    index: usize,
}

impl<C> Clone for Next<C> {
    fn clone(&self) -> Self {
        Self {
            units: Arc::clone(&self.units),
            terminal: self.terminal.clone(),
            cursor: Arc::clone(&self.cursor),
            index: self.index,
        }
    }
}

impl<C> Next<C> {
    /// Passes control to the next unit in the chain.
    pub fn run(&self, ctx: C) -> Pending {
        dispatch(
            Arc::clone(&self.units),
            self.terminal.clone(),
            Arc::clone(&self.cursor),
            self.index,
            ctx,
        )
    }
}

fn dispatch<C>(
    units: Arc<[Unit<C>]>,
    terminal: Option<Unit<C>>,
    cursor: Arc<AtomicI64>,
    index: usize,
    ctx: C,
) -> Pending {
    let position = index as i64;
    // the cursor only ever moves forward
    let last = cursor.fetch_max(position, Ordering::SeqCst);
    if last >= position {
        return Pending::err(FlowError::NextCalledMultipleTimes);
    }
    let Some(unit) = units.get(index).cloned().or_else(|| terminal.clone()) else {
        return Pending::ok(Value::Null);
    };
    let next = Next {
        units,
        terminal,
        cursor,
        index: index + 1,
    };
    unit(ctx, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracing_unit(name: &'static str) -> Unit<Log> {
        unit(move |ctx: Log, next: Next<Log>| {
            ctx.lock().unwrap().push(format!("{name}:before"));
            Pending::from_future(async move {
                let out = next.run(Arc::clone(&ctx)).await;
                ctx.lock().unwrap().push(format!("{name}:after"));
                out
            })
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn units_run_in_list_order_and_unwind_in_reverse() {
        let log: Log = Arc::default();
        let chain = Chain::new(vec![tracing_unit("a"), tracing_unit("b")]);
        let out = chain.call(Arc::clone(&log), None).await;
        assert_eq!(out, Ok(Value::Null));
        assert_eq!(
            entries(&log),
            vec!["a:before", "b:before", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn empty_chain_completes_successfully() {
        let chain: Chain<Log> = Chain::default();
        assert!(chain.is_empty());
        let out = chain.call(Arc::default(), None).await;
        assert_eq!(out, Ok(Value::Null));
    }

    #[tokio::test]
    async fn terminal_runs_after_the_last_unit() {
        let log: Log = Arc::default();
        let chain = Chain::new(vec![tracing_unit("a")]);
        let terminal = unit(|ctx: Log, _next: Next<Log>| {
            ctx.lock().unwrap().push("terminal".to_string());
            Pending::ok("done")
        });
        let out = chain.call(Arc::clone(&log), Some(terminal)).await;
        assert_eq!(out, Ok(json!("done")));
        assert_eq!(entries(&log), vec!["a:before", "terminal", "a:after"]);
    }

    // ── short-circuiting ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn a_unit_that_never_continues_halts_the_chain() {
        let log: Log = Arc::default();
        let halting = unit(|ctx: Log, _next: Next<Log>| {
            ctx.lock().unwrap().push("halt".to_string());
            Pending::ok("stopped here")
        });
        let chain = Chain::new(vec![tracing_unit("a"), halting, tracing_unit("c")]);
        let out = chain.call(Arc::clone(&log), None).await;
        assert_eq!(out, Ok(json!("stopped here")));
        assert_eq!(entries(&log), vec!["a:before", "halt", "a:after"]);
    }

    #[tokio::test]
    async fn a_failing_unit_fails_the_invocation() {
        let failing = unit(|_ctx: Log, _next: Next<Log>| {
            Pending::err(FlowError::raised("unit down"))
        });
        let chain = Chain::new(vec![tracing_unit("a"), failing]);
        let out = chain.call(Arc::default(), None).await;
        assert_eq!(out, Err(FlowError::raised("unit down")));
    }

    // ── reentrancy guard ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn running_next_twice_is_an_error() {
        let greedy = unit(|ctx: Log, next: Next<Log>| {
            Pending::from_future(async move {
                next.run(Arc::clone(&ctx)).await?;
                next.run(ctx).await
            })
        });
        let chain = Chain::new(vec![greedy]);
        let out = chain.call(Arc::default(), None).await;
        assert_eq!(out, Err(FlowError::NextCalledMultipleTimes));
    }

    #[tokio::test]
    async fn the_guard_fires_every_time() {
        let greedy = unit(|ctx: Log, next: Next<Log>| {
            Pending::from_future(async move {
                next.run(Arc::clone(&ctx)).await?;
                next.run(Arc::clone(&ctx)).await?;
                next.run(ctx).await
            })
        });
        let chain = Chain::new(vec![greedy, tracing_unit("tail")]);
        for _ in 0..2 {
            let out = chain.call(Arc::default(), None).await;
            assert_eq!(out, Err(FlowError::NextCalledMultipleTimes));
        }
    }

    // ── nesting ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn a_chain_embeds_as_a_unit_of_an_outer_chain() {
        let log: Log = Arc::default();
        let inner = Chain::new(vec![tracing_unit("inner-a"), tracing_unit("inner-b")]);
        let outer = Chain::new(vec![inner.to_unit(), tracing_unit("tail")]);
        let out = outer.call(Arc::clone(&log), None).await;
        assert_eq!(out, Ok(Value::Null));
        assert_eq!(
            entries(&log),
            vec![
                "inner-a:before",
                "inner-b:before",
                "tail:before",
                "tail:after",
                "inner-b:after",
                "inner-a:after"
            ]
        );
    }
}
