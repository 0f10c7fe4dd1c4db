//! Prefix dispatch — walk an ordered layer stack over a mutable request.
//!
//! A [`Stack`] holds `(path prefix, handler)` layers in registration order.
//! Handling a request walks the list front to back: a layer runs only when its
//! prefix matches the current path, and the matched prefix is stripped from
//! the URL for the duration of that layer's handler, then restored exactly.
//!
//! Prefix matching is case-insensitive on a trailing-slash-trimmed prefix and
//! must end on a segment boundary:
//!
//! | Prefix    | Path               | Match? |
//! |-----------|--------------------|--------|
//! | `/admin`  | `/admin`           | yes    |
//! | `/admin`  | `/admin/settings`  | yes    |
//! | `/admin`  | `/admin.json`      | yes    |
//! | `/admin`  | `/administration`  | no     |
//!
//! Layers are registered as one of two kinds. Request handlers run while no
//! error is pending; error handlers run only once a layer has raised. A layer
//! of the wrong kind for the current state is skipped with the pending error
//! intact. When the stack is exhausted, the externally supplied terminal
//! handler receives whatever error is still pending — on a fresh scheduling
//! turn, never synchronously.

mod request;

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::error::FlowError;

pub use request::{Extensions, Headers, Request};

/// A layer handler's verdict on what happens next.
pub enum Control {
    /// Pass control to the next matching layer.
    Next,
    /// Raise an error: only error-handling layers run until one recovers.
    /// A newly raised error replaces any earlier one.
    Raise(FlowError),
    /// The response is complete; stop walking the stack.
    Halt,
}

/// A request-handling layer function.
///
/// Receives the rewritten request and the response sink; resolves to a
/// [`Control`] verdict. Runs only while no error is pending.
pub type Handler<R> = Arc<
    dyn for<'a> Fn(&'a mut Request, &'a mut R) -> BoxFuture<'a, Control> + Send + Sync,
>;

/// An error-handling layer function.
///
/// Receives the pending error by value; returning [`Control::Next`] recovers
/// and resumes normal flow. Runs only while an error is pending.
pub type ErrorHandler<R> = Arc<
    dyn for<'a> Fn(FlowError, &'a mut Request, &'a mut R) -> BoxFuture<'a, Control>
        + Send
        + Sync,
>;

enum Kind<R> {
    Request(Handler<R>),
    Error(ErrorHandler<R>),
}

// A registered (prefix, handler) pair. The route is stored with its trailing
// slash trimmed, so the root mount is the empty string.
struct Layer<R> {
    route: String,
    kind: Kind<R>,
}

// Whether a traversal fell off the end of the stack or was halted by a layer.
enum Walk {
    Halted,
    Exhausted(Option<FlowError>),
}

/// An ordered prefix-dispatch stack over a response sink type `R`.
///
/// # Examples
///
/// ```rust,no_run
/// use lamina::{Control, Request, Stack};
///
/// # async fn demo() {
/// let mut app: Stack<Vec<String>> = Stack::new();
/// app.mount("/api", |req, res| {
///     Box::pin(async move {
///         res.push(format!("api hit: {}", req.url()));
///         Control::Halt
///     })
/// });
///
/// let mut req = Request::new("GET", "/api/users");
/// let mut res = Vec::new();
/// app.handle(&mut req, &mut res, |error, _req, _res| {
///     if let Some(error) = error {
///         eprintln!("unhandled: {error}");
///     }
/// })
/// .await;
/// # }
/// ```
pub struct Stack<R> {
    layers: Vec<Layer<R>>,
}

impl<R> Default for Stack<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Stack<R> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Returns the number of mounted layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if no layers are mounted.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Mounts a request handler under `route`.
    ///
    /// The handler runs for every request whose path starts with `route` on a
    /// segment boundary, with the prefix stripped from the URL for the
    /// duration of the call.
    pub fn mount<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        R: 'static,
        F: for<'a> Fn(&'a mut Request, &'a mut R) -> BoxFuture<'a, Control>
            + Send
            + Sync
            + 'static,
    {
        self.push_layer(route, Kind::Request(Arc::new(handler)))
    }

    /// Mounts a request handler at the root (every path).
    pub fn push<F>(&mut self, handler: F) -> &mut Self
    where
        R: 'static,
        F: for<'a> Fn(&'a mut Request, &'a mut R) -> BoxFuture<'a, Control>
            + Send
            + Sync
            + 'static,
    {
        self.mount("/", handler)
    }

    /// Mounts an error handler under `route`.
    ///
    /// Error handlers only run while an error is pending; one that returns
    /// [`Control::Next`] recovers the flow for subsequent request handlers.
    pub fn mount_err<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        R: 'static,
        F: for<'a> Fn(FlowError, &'a mut Request, &'a mut R) -> BoxFuture<'a, Control>
            + Send
            + Sync
            + 'static,
    {
        self.push_layer(route, Kind::Error(Arc::new(handler)))
    }

    /// Mounts an error handler at the root (every path).
    pub fn push_err<F>(&mut self, handler: F) -> &mut Self
    where
        R: 'static,
        F: for<'a> Fn(FlowError, &'a mut Request, &'a mut R) -> BoxFuture<'a, Control>
            + Send
            + Sync
            + 'static,
    {
        self.mount_err("/", handler)
    }

    fn push_layer(&mut self, route: &str, kind: Kind<R>) -> &mut Self {
        let route = trim_route(route);
        let shown = if route.is_empty() { "/" } else { route.as_str() };
        debug!(route = %shown, "layer mounted");
        self.layers.push(Layer { route, kind });
        self
    }

    /// Walks the stack for one request.
    ///
    /// Each matching layer runs in registration order until one halts or the
    /// stack is exhausted, at which point `terminal` receives any still-
    /// pending error. The terminal handler is always invoked on a later
    /// scheduling turn, bounding call-stack depth across long stacks. If a
    /// layer halts, the terminal handler never runs.
    pub async fn handle<F>(&self, req: &mut Request, res: &mut R, terminal: F)
    where
        F: FnOnce(Option<FlowError>, &mut Request, &mut R),
    {
        req.preserve_original_url();
        match self.traverse(req, res).await {
            Walk::Halted => {}
            Walk::Exhausted(error) => {
                tokio::task::yield_now().await;
                terminal(error, req, res);
            }
        }
    }

    async fn traverse(&self, req: &mut Request, res: &mut R) -> Walk {
        let protohost = protohost(req.url()).unwrap_or_default().to_owned();
        let mut error: Option<FlowError> = None;
        let mut removed = String::new();
        let mut slash_added = false;

        for layer in &self.layers {
            undo_rewrite(req, &protohost, &mut removed, &mut slash_added);

            let path = req.path().to_owned();
            if !prefix_matches(&path, &layer.route) {
                trace!(route = %layer.route, path = %path, "prefix miss");
                continue;
            }

            if !layer.route.is_empty() {
                // record the characters actually removed, so restoration
                // reproduces the original casing exactly
                let start = protohost.len();
                let end = start + layer.route.len();
                removed = req.url().get(start..end).unwrap_or_default().to_owned();
                let rest = req.url().get(end..).unwrap_or_default().to_owned();
                req.set_url(format!("{protohost}{rest}"));
                if protohost.is_empty() && !req.url().starts_with('/') {
                    req.set_url(format!("/{}", req.url()));
                    slash_added = true;
                }
            }

            let verdict = match (&layer.kind, error.take()) {
                (Kind::Request(handler), None) => {
                    debug!(route = %layer.route, url = %req.url(), "invoke layer");
                    handler(req, res).await
                }
                (Kind::Error(handler), Some(pending)) => {
                    debug!(route = %layer.route, error = %pending, "invoke error layer");
                    handler(pending, req, res).await
                }
                // wrong kind for the current state: skip, error intact
                (_, pending) => {
                    error = pending;
                    continue;
                }
            };

            match verdict {
                Control::Next => {}
                Control::Raise(raised) => error = Some(raised),
                Control::Halt => return Walk::Halted,
            }
        }

        undo_rewrite(req, &protohost, &mut removed, &mut slash_added);
        Walk::Exhausted(error)
    }
}

impl<R: Send + 'static> Stack<R> {
    /// Mounts a whole sub-stack under `route`.
    ///
    /// The sub-stack sees prefix-stripped URLs, never clobbers the original
    /// URL recorded by the outermost stack, and rejoins the parent's flow:
    /// halting inside the sub-stack halts the parent, and an error left
    /// unhandled by the sub-stack continues through the parent's layers.
    pub fn mount_stack(&mut self, route: &str, sub: Stack<R>) -> &mut Self {
        let sub = Arc::new(sub);
        self.mount(route, move |req, res| {
            let sub = Arc::clone(&sub);
            Box::pin(async move {
                match sub.traverse(req, res).await {
                    Walk::Halted => Control::Halt,
                    Walk::Exhausted(None) => Control::Next,
                    Walk::Exhausted(Some(error)) => Control::Raise(error),
                }
            })
        })
    }
}

// Registration trims one trailing slash, so "/" mounts as the match-all
// empty prefix.
fn trim_route(route: &str) -> String {
    route.strip_suffix('/').unwrap_or(route).to_string()
}

fn undo_rewrite(
    req: &mut Request,
    protohost: &str,
    removed: &mut String,
    slash_added: &mut bool,
) {
    if *slash_added {
        let rest = req.url().get(1..).unwrap_or_default().to_owned();
        req.set_url(rest);
        *slash_added = false;
    }
    if !removed.is_empty() {
        let tail = req.url().get(protohost.len()..).unwrap_or_default().to_owned();
        req.set_url(format!("{protohost}{removed}{tail}"));
        removed.clear();
    }
}

// Case-insensitive prefix match ending on `/`, `.`, or end-of-path.
fn prefix_matches(path: &str, route: &str) -> bool {
    let Some(prefix) = path.get(..route.len()) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case(route) {
        return false;
    }
    matches!(path.as_bytes().get(route.len()), None | Some(b'/') | Some(b'.'))
}

// The path portion of a URL: protocol+host and query stripped, "/" when empty.
pub(crate) fn pathname(url: &str) -> &str {
    let rest = match protohost(url) {
        Some(ph) => url.get(ph.len()..).unwrap_or_default(),
        None => url,
    };
    let end = rest.find('?').unwrap_or(rest.len());
    let path = &rest[..end];
    if path.is_empty() { "/" } else { path }
}

// The protocol+host portion of an absolute URL, if any.
fn protohost(url: &str) -> Option<&str> {
    if url.is_empty() || url.starts_with('/') {
        return None;
    }
    let path_len = url.find('?').unwrap_or(url.len());
    let scheme_end = url[..path_len].find("://")?;
    match url[scheme_end + 3..].find('/') {
        Some(slash) => Some(&url[..scheme_end + 3 + slash]),
        None => Some(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── pure helpers ──────────────────────────────────────────────────────────

    #[test]
    fn prefix_boundary_rule() {
        assert!(prefix_matches("/admin", "/admin"));
        assert!(prefix_matches("/admin/x", "/admin"));
        assert!(prefix_matches("/admin.json", "/admin"));
        assert!(!prefix_matches("/administration", "/admin"));
        assert!(!prefix_matches("/adm", "/admin"));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        assert!(prefix_matches("/ADMIN/panel", "/Admin"));
        assert!(prefix_matches("/Admin", "/admin"));
    }

    #[test]
    fn empty_route_matches_any_rooted_path() {
        assert!(prefix_matches("/", ""));
        assert!(prefix_matches("/anything/at/all", ""));
    }

    #[test]
    fn trim_route_strips_one_trailing_slash() {
        assert_eq!(trim_route("/"), "");
        assert_eq!(trim_route("/api/"), "/api");
        assert_eq!(trim_route("/api"), "/api");
    }

    #[test]
    fn pathname_strips_query_and_protohost() {
        assert_eq!(pathname("/users?id=1"), "/users");
        assert_eq!(pathname("http://example.com/users"), "/users");
        assert_eq!(pathname("http://example.com"), "/");
        assert_eq!(pathname("/"), "/");
    }

    #[test]
    fn protohost_detection() {
        assert_eq!(protohost("/users"), None);
        assert_eq!(
            protohost("http://example.com/users?x=1"),
            Some("http://example.com")
        );
        assert_eq!(protohost("http://example.com"), Some("http://example.com"));
    }

    // ── traversal ─────────────────────────────────────────────────────────────

    type Sink = Vec<String>;

    #[tokio::test]
    async fn layers_run_in_order_with_rewritten_paths() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/", |req, res| {
            Box::pin(async move {
                res.push(format!("A {}", req.url()));
                Control::Next
            })
        });
        app.mount("/api", |req, res| {
            Box::pin(async move {
                res.push(format!("B {}", req.url()));
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/api/users");
        let mut res = Sink::new();
        let mut outcome = None;
        app.handle(&mut req, &mut res, |error, req, _res| {
            outcome = Some((error, req.original_url().map(str::to_owned)));
        })
        .await;

        assert_eq!(res, vec!["A /api/users", "B /users"]);
        let (error, original) = outcome.expect("terminal handler must run");
        assert_eq!(error, None);
        assert_eq!(original.as_deref(), Some("/api/users"));
        assert_eq!(req.url(), "/api/users");
    }

    #[tokio::test]
    async fn non_matching_layers_are_skipped() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/admin", |_req, res| {
            Box::pin(async move {
                res.push("admin".to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/administration");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn restoration_preserves_original_casing() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/Admin", |req, res| {
            Box::pin(async move {
                res.push(req.url().to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/ADMIN/panel");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert_eq!(res, vec!["/panel"]);
        assert_eq!(req.url(), "/ADMIN/panel");
    }

    #[tokio::test]
    async fn stripping_the_whole_path_leaves_a_root_slash() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/api", |req, res| {
            Box::pin(async move {
                res.push(req.url().to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/api");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert_eq!(res, vec!["/"]);
        assert_eq!(req.url(), "/api");
    }

    #[tokio::test]
    async fn query_string_survives_rewriting() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/api", |req, res| {
            Box::pin(async move {
                res.push(req.url().to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/api/users?page=2");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert_eq!(res, vec!["/users?page=2"]);
        assert_eq!(req.url(), "/api/users?page=2");
    }

    #[tokio::test]
    async fn absolute_urls_keep_their_protohost() {
        let mut app: Stack<Sink> = Stack::new();
        app.mount("/api", |req, res| {
            Box::pin(async move {
                res.push(req.url().to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "http://example.com/api/users");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert_eq!(res, vec!["http://example.com/users"]);
        assert_eq!(req.url(), "http://example.com/api/users");
    }

    // ── error routing ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn raised_errors_skip_request_handlers_until_recovered() {
        let mut app: Stack<Sink> = Stack::new();
        app.push(|_req, _res| {
            Box::pin(async move { Control::Raise(FlowError::raised("boom")) })
        });
        app.push(|_req, res| {
            Box::pin(async move {
                res.push("skipped request handler".to_string());
                Control::Next
            })
        });
        app.push_err(|error, _req, res| {
            Box::pin(async move {
                res.push(format!("caught {error}"));
                Control::Next
            })
        });
        app.push(|_req, res| {
            Box::pin(async move {
                res.push("after recovery".to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/");
        let mut res = Sink::new();
        let mut terminal_error = Some(FlowError::raised("sentinel"));
        app.handle(&mut req, &mut res, |error, _, _| {
            terminal_error = error;
        })
        .await;

        assert_eq!(res, vec!["caught boom", "after recovery"]);
        assert_eq!(terminal_error, None);
    }

    #[tokio::test]
    async fn error_handlers_are_skipped_without_a_pending_error() {
        let mut app: Stack<Sink> = Stack::new();
        app.push_err(|_error, _req, res| {
            Box::pin(async move {
                res.push("error handler".to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn unhandled_errors_reach_the_terminal_handler() {
        let mut app: Stack<Sink> = Stack::new();
        app.push(|_req, _res| {
            Box::pin(async move { Control::Raise(FlowError::raised("unhandled")) })
        });

        let mut req = Request::new("GET", "/");
        let mut res = Sink::new();
        let mut seen = None;
        app.handle(&mut req, &mut res, |error, _, _| {
            seen = error;
        })
        .await;
        assert_eq!(seen, Some(FlowError::raised("unhandled")));
    }

    #[tokio::test]
    async fn a_later_error_replaces_the_earlier_one() {
        let mut app: Stack<Sink> = Stack::new();
        app.push(|_req, _res| {
            Box::pin(async move { Control::Raise(FlowError::raised("first")) })
        });
        app.push_err(|_error, _req, _res| {
            Box::pin(async move { Control::Raise(FlowError::raised("second")) })
        });

        let mut req = Request::new("GET", "/");
        let mut res = Sink::new();
        let mut seen = None;
        app.handle(&mut req, &mut res, |error, _, _| {
            seen = error;
        })
        .await;
        assert_eq!(seen, Some(FlowError::raised("second")));
    }

    #[tokio::test]
    async fn halting_skips_later_layers_and_the_terminal_handler() {
        let mut app: Stack<Sink> = Stack::new();
        app.push(|_req, res| {
            Box::pin(async move {
                res.push("halting".to_string());
                Control::Halt
            })
        });
        app.push(|_req, res| {
            Box::pin(async move {
                res.push("unreached".to_string());
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/");
        let mut res = Sink::new();
        let mut terminal_ran = false;
        app.handle(&mut req, &mut res, |_, _, _| {
            terminal_ran = true;
        })
        .await;
        assert_eq!(res, vec!["halting"]);
        assert!(!terminal_ran);
    }

    #[tokio::test]
    async fn empty_stack_falls_through_to_the_terminal_handler() {
        let app: Stack<Sink> = Stack::new();
        let mut req = Request::new("GET", "/missing");
        let mut res = Sink::new();
        let mut outcome = None;
        app.handle(&mut req, &mut res, |error, req, _| {
            outcome = Some((error, req.original_url().map(str::to_owned)));
        })
        .await;
        let (error, original) = outcome.expect("terminal handler must run");
        assert_eq!(error, None);
        assert_eq!(original.as_deref(), Some("/missing"));
    }

    // ── sub-stacks ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sub_stacks_see_stripped_paths_and_rejoin_parent_flow() {
        let mut sub: Stack<Sink> = Stack::new();
        sub.mount("/users", |req, res| {
            Box::pin(async move {
                res.push(format!("sub {}", req.url()));
                Control::Next
            })
        });

        let mut app: Stack<Sink> = Stack::new();
        app.mount_stack("/v1", sub);
        app.push(|req, res| {
            Box::pin(async move {
                res.push(format!("parent {}", req.url()));
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/v1/users/7");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;

        assert_eq!(res, vec!["sub /7", "parent /v1/users/7"]);
        assert_eq!(req.url(), "/v1/users/7");
        assert_eq!(req.original_url(), Some("/v1/users/7"));
    }

    #[tokio::test]
    async fn sub_stack_errors_continue_through_the_parent() {
        let mut sub: Stack<Sink> = Stack::new();
        sub.push(|_req, _res| {
            Box::pin(async move { Control::Raise(FlowError::raised("from sub")) })
        });

        let mut app: Stack<Sink> = Stack::new();
        app.mount_stack("/v1", sub);
        app.push_err(|error, _req, res| {
            Box::pin(async move {
                res.push(format!("parent caught {error}"));
                Control::Next
            })
        });

        let mut req = Request::new("GET", "/v1/thing");
        let mut res = Sink::new();
        app.handle(&mut req, &mut res, |_, _, _| {}).await;
        assert_eq!(res, vec!["parent caught from sub"]);
    }
}
