//! End-to-end demo: a prefix dispatch stack with a routine-powered layer.
//!
//! Run with: `RUST_LOG=debug cargo run --example hello_stack`

use lamina::{run, Control, FlowError, Pending, Request, Routine, Stack, Step, Value, Yielded};
use serde_json::json;

/// The demo's response sink: a status code plus body lines.
#[derive(Debug, Default)]
struct Reply {
    status: u16,
    body: Vec<String>,
}

/// A two-suspension lookup: awaits a pending user list, then a
/// callback-style count, and finishes with the combined payload.
struct Lookup {
    state: u32,
    users: Value,
}

impl Routine for Lookup {
    fn advance(&mut self, input: Value) -> Result<Step, FlowError> {
        self.state += 1;
        match self.state {
            1 => Ok(Step::Yield(Yielded::from(Pending::ok(json!([
                "ada", "grace"
            ]))))),
            2 => {
                self.users = input;
                Ok(Step::Yield(Yielded::callback(|done| done.resolve(2))))
            }
            _ => Ok(Step::Done(json!({
                "users": std::mem::take(&mut self.users),
                "count": input,
            }))),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app: Stack<Reply> = Stack::new();

    // access log
    app.push(|req, _res| {
        let line = format!("{} {}", req.method(), req.url());
        Box::pin(async move {
            tracing::info!("{line}");
            Control::Next
        })
    });

    // the API layer produces its payload by driving a routine
    app.mount("/api/users", |_req, res| {
        Box::pin(async move {
            match run(Lookup {
                state: 0,
                users: Value::Null,
            })
            .await
            {
                Ok(payload) => {
                    res.status = 200;
                    res.body.push(payload.to_string());
                    Control::Halt
                }
                Err(error) => Control::Raise(error),
            }
        })
    });

    // anything raised above lands here
    app.push_err(|error, _req, res| {
        Box::pin(async move {
            res.status = 500;
            res.body.push(format!("error: {error}"));
            Control::Halt
        })
    });

    let mut req = Request::new("GET", "/api/users?active=1");
    let mut res = Reply::default();
    app.handle(&mut req, &mut res, |error, req, res| {
        res.status = if error.is_some() { 500 } else { 404 };
        res.body.push(format!(
            "no layer ended {}",
            req.original_url().unwrap_or("?")
        ));
    })
    .await;

    println!("{} {} -> {:?}", req.method(), req.url(), res);
}
