//! The dispatch loop: matched plugins in order, then the terminal handler.
//!
//! # State Machine
//! ```text
//! RunningPlugin(i) ──proceed──▶ RunningPlugin(i+1) … ──▶ RunningTerminal ──▶ Done
//!        │                                                     │
//!        └── finalized / halted / rejected / failed ──▶ Done ◀─┘
//! ```
//!
//! # Design Decisions
//! - Iterative: stack depth does not grow with the number of plugins
//! - Plugins and handlers run under `catch_unwind`; a panic is a runtime failure
//! - Every exit path leaves the response finalized
//! - Failures are logged here and never propagate past the dispatcher

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use futures_util::FutureExt;

use crate::context::{Finalized, RequestContext};
use crate::dispatch::handler::{HandlerError, Next, Proceed, Step};
use crate::routing::{HandlerEntry, PluginEntry, Resolution, RouterTable};

/// How a request left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The terminal handler produced the response.
    Completed,
    /// A plugin finalized the response and dispatch stopped there.
    Stopped { plugin: usize },
    /// A plugin or handler aborted with its own response.
    Halted,
    /// No route matched: 404.
    NotFound,
    /// A plugin broke the continuation contract: 418.
    PluginRejected { plugin: usize },
    /// The handler sent nothing of its own and returned a foreign response token: 500.
    ContractViolation,
    /// A plugin or handler failed or panicked.
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Completed => "completed",
            DispatchOutcome::Stopped { .. } => "stopped",
            DispatchOutcome::Halted => "halted",
            DispatchOutcome::NotFound => "not_found",
            DispatchOutcome::PluginRejected { .. } => "plugin_rejected",
            DispatchOutcome::ContractViolation => "contract_violation",
            DispatchOutcome::Failed => "failed",
        }
    }
}

enum State {
    RunningPlugin(usize),
    RunningTerminal,
    Done(DispatchOutcome),
}

/// Resolve `ctx` against `table`, store the route params, and walk the pipeline.
pub async fn dispatch(table: &RouterTable, ctx: &mut RequestContext) -> DispatchOutcome {
    let method = ctx.method().clone();
    let url = ctx.url().to_string();
    let Resolution { plugins, route } = table.resolve(&method, &url);

    let route = route.map(|matched| {
        ctx.set_params(matched.params);
        matched.entry
    });

    tracing::debug!(
        context = %ctx.id(),
        method = %method,
        url = %url,
        plugins = plugins.len(),
        route = route.map(|r| r.template()),
        "Dispatching request"
    );

    walkthrough(ctx, &plugins, route).await
}

/// Run `plugins` in order, then `route`.
pub async fn walkthrough(
    ctx: &mut RequestContext,
    plugins: &[&PluginEntry],
    route: Option<&HandlerEntry>,
) -> DispatchOutcome {
    let mut state = if plugins.is_empty() {
        State::RunningTerminal
    } else {
        State::RunningPlugin(0)
    };

    loop {
        state = match state {
            State::RunningPlugin(index) => match plugins.get(index) {
                Some(entry) => run_plugin(ctx, index, entry).await,
                None => State::RunningTerminal,
            },
            State::RunningTerminal => State::Done(run_terminal(ctx, route).await),
            State::Done(outcome) => return outcome,
        };
    }
}

async fn run_plugin(ctx: &mut RequestContext, index: usize, entry: &PluginEntry) -> State {
    let expected = Proceed {
        context: ctx.id(),
        position: index,
    };
    let next = Next::new(ctx.id(), index);
    let result = AssertUnwindSafe(entry.handler().call(ctx, next))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(Step::Continue(proceed))) if proceed == expected => {
            if ctx.response().is_finalized() {
                State::Done(DispatchOutcome::Stopped { plugin: index })
            } else {
                State::RunningPlugin(index + 1)
            }
        }
        Ok(Ok(Step::Continue(_))) => {
            tracing::warn!(
                context = %ctx.id(),
                plugin = index,
                template = entry.template(),
                "Plugin returned a continuation that was not issued to it"
            );
            State::Done(reject_plugin(ctx, index))
        }
        Ok(Ok(Step::Finished(token))) => {
            if owns(ctx, token) {
                State::Done(DispatchOutcome::Stopped { plugin: index })
            } else {
                tracing::warn!(
                    context = %ctx.id(),
                    plugin = index,
                    template = entry.template(),
                    "Plugin returned a response token from another request"
                );
                State::Done(reject_plugin(ctx, index))
            }
        }
        Ok(Err(HandlerError::Halted(token))) if owns(ctx, token) => {
            State::Done(DispatchOutcome::Halted)
        }
        Ok(Err(err)) => {
            tracing::error!(
                context = %ctx.id(),
                plugin = index,
                template = entry.template(),
                error = %err,
                "Plugin failed"
            );
            finish(ctx, StatusCode::INTERNAL_SERVER_ERROR);
            State::Done(DispatchOutcome::Failed)
        }
        Err(panic) => {
            tracing::error!(
                context = %ctx.id(),
                plugin = index,
                template = entry.template(),
                panic = panic_message(&*panic),
                "Plugin panicked"
            );
            finish(ctx, StatusCode::INTERNAL_SERVER_ERROR);
            State::Done(DispatchOutcome::Failed)
        }
    }
}

async fn run_terminal(ctx: &mut RequestContext, route: Option<&HandlerEntry>) -> DispatchOutcome {
    let Some(entry) = route else {
        tracing::debug!(context = %ctx.id(), url = ctx.url(), "No route matched");
        finish(ctx, StatusCode::NOT_FOUND);
        return DispatchOutcome::NotFound;
    };

    let result = AssertUnwindSafe(entry.handler().call(ctx))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(token)) if owns(ctx, token) => DispatchOutcome::Completed,
        Ok(Err(HandlerError::Halted(token))) if owns(ctx, token) => DispatchOutcome::Halted,
        Ok(Ok(_)) | Ok(Err(HandlerError::Halted(_))) if ctx.response().is_finalized() => {
            tracing::warn!(
                context = %ctx.id(),
                template = entry.template(),
                "Handler returned a response token from another request; keeping the response it sent"
            );
            DispatchOutcome::Completed
        }
        Ok(Ok(_)) | Ok(Err(HandlerError::Halted(_))) => {
            tracing::warn!(
                context = %ctx.id(),
                template = entry.template(),
                "Handler never produced a response of its own"
            );
            finish(ctx, StatusCode::INTERNAL_SERVER_ERROR);
            DispatchOutcome::ContractViolation
        }
        Ok(Err(err)) => {
            tracing::error!(
                context = %ctx.id(),
                template = entry.template(),
                error = %err,
                "Handler failed"
            );
            fail_preserving_status(ctx);
            DispatchOutcome::Failed
        }
        Err(panic) => {
            tracing::error!(
                context = %ctx.id(),
                template = entry.template(),
                panic = panic_message(&*panic),
                "Handler panicked"
            );
            fail_preserving_status(ctx);
            DispatchOutcome::Failed
        }
    }
}

fn owns(ctx: &RequestContext, token: Finalized) -> bool {
    ctx.response().finalized() == Some(token)
}

fn reject_plugin(ctx: &mut RequestContext, index: usize) -> DispatchOutcome {
    finish(ctx, StatusCode::IM_A_TEAPOT);
    DispatchOutcome::PluginRejected { plugin: index }
}

/// Finalize with `status` and an empty body, unless already finalized.
fn finish(ctx: &mut RequestContext, status: StatusCode) {
    if ctx.response().is_finalized() {
        return;
    }
    ctx.set_status(status);
    ctx.end();
}

fn fail_preserving_status(ctx: &mut RequestContext) {
    let status = ctx
        .response()
        .explicit_status()
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    finish(ctx, status);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::http::Method;

    use crate::context::test_context;
    use crate::dispatch::{handler, plugin, Handler, Plugin};
    use crate::routing::{RouteEntry, RouteMethod};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recording_plugin(log: &Log, name: &'static str) -> Arc<dyn Plugin> {
        let log = log.clone();
        plugin(move |_ctx, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                Ok(next.proceed())
            })
        })
    }

    fn recording_handler(log: &Log, name: &'static str) -> Arc<dyn Handler> {
        let log = log.clone();
        handler(move |ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                Ok(ctx.text(name))
            })
        })
    }

    fn table_with(plugins: Vec<(&str, Arc<dyn Plugin>)>, routes: Vec<(RouteMethod, &str, Arc<dyn Handler>)>) -> RouterTable {
        let mut table = RouterTable::new();
        for (template, p) in plugins {
            table.add_plugin(RouteEntry::new(RouteMethod::Any, template, p).unwrap());
        }
        for (method, template, h) in routes {
            table.add_route(RouteEntry::new(method, template, h).unwrap());
        }
        table
    }

    #[tokio::test]
    async fn test_plugins_run_in_order_before_handler() {
        let log: Log = Arc::default();
        let table = table_with(
            vec![("/*", recording_plugin(&log, "p1")), ("/user/:id", recording_plugin(&log, "p2"))],
            vec![(RouteMethod::Get, "/user/:id", recording_handler(&log, "route"))],
        );

        let mut ctx = test_context(Method::GET, "/user/42?x=1", &[], "");
        let outcome = dispatch(&table, &mut ctx).await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(*log.lock().unwrap(), ["p1", "p2", "route"]);
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.query_param("x"), Some("1"));
    }

    #[tokio::test]
    async fn test_no_route_is_404_with_empty_body() {
        let table = table_with(vec![], vec![]);
        let mut ctx = test_context(Method::GET, "/nowhere", &[], "");

        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::NotFound);
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response().body_bytes(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_wildcard_plugin_still_runs_before_404() {
        let log: Log = Arc::default();
        let table = table_with(vec![("/*", recording_plugin(&log, "global"))], vec![]);
        let mut ctx = test_context(Method::DELETE, "/nowhere", &[], "");

        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::NotFound);
        assert_eq!(*log.lock().unwrap(), ["global"]);
    }

    #[tokio::test]
    async fn test_foreign_continuation_is_418_and_skips_handler() {
        let log: Log = Arc::default();
        let rogue = plugin(|ctx, _next| {
            Box::pin(async move {
                Ok(Step::Continue(Proceed {
                    context: ctx.id(),
                    position: 7,
                }))
            })
        });
        let table = table_with(
            vec![("/*", rogue), ("/*", recording_plugin(&log, "after"))],
            vec![(RouteMethod::Get, "/", recording_handler(&log, "route"))],
        );

        let mut ctx = test_context(Method::GET, "/", &[], "");
        let outcome = dispatch(&table, &mut ctx).await;

        assert_eq!(outcome, DispatchOutcome::PluginRejected { plugin: 0 });
        assert_eq!(ctx.status(), StatusCode::IM_A_TEAPOT);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plugin_can_answer_and_stop() {
        let log: Log = Arc::default();
        let gate = plugin(|ctx, _next| {
            Box::pin(async move {
                ctx.set_status(StatusCode::UNAUTHORIZED);
                Ok(ctx.text("login first").into())
            })
        });
        let table = table_with(
            vec![("/*", gate)],
            vec![(RouteMethod::Get, "/", recording_handler(&log, "route"))],
        );

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Stopped { plugin: 0 });
        assert_eq!(ctx.status(), StatusCode::UNAUTHORIZED);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plugin_failure_is_500() {
        let broken = plugin(|_ctx, _next| {
            Box::pin(async move { Err(HandlerError::failed("database unreachable")) })
        });
        let table = table_with(vec![("/*", broken)], vec![]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Failed);
        assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_plugin_panic_is_500() {
        let broken = plugin(|ctx, next| {
            Box::pin(async move {
                if ctx.header("x-survive").is_none() {
                    panic!("boom");
                }
                Ok(next.proceed())
            })
        });
        let table = table_with(vec![("/*", broken)], vec![]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Failed);
        assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(ctx.response().is_finalized());
    }

    #[tokio::test]
    async fn test_foreign_response_token_is_contract_violation() {
        let liar = handler(|_ctx| {
            Box::pin(async move {
                let mut other = test_context(Method::GET, "/elsewhere", &[], "");
                Ok(other.text("not for you"))
            })
        });
        let table = table_with(vec![], vec![(RouteMethod::Get, "/", liar)]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::ContractViolation);
        assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.response().body_bytes(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_foreign_token_after_own_response_keeps_that_response() {
        let muddled = handler(|ctx| {
            Box::pin(async move {
                ctx.text("mine");
                let mut other = test_context(Method::GET, "/elsewhere", &[], "");
                Ok(other.text("not for you"))
            })
        });
        let table = table_with(vec![], vec![(RouteMethod::Get, "/", muddled)]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Completed);
        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(ctx.response().body_bytes(), Some(&b"mine"[..]));
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_explicit_status() {
        let failing = handler(|ctx| {
            Box::pin(async move {
                ctx.set_status(StatusCode::SERVICE_UNAVAILABLE);
                Err(HandlerError::failed("upstream down"))
            })
        });
        let table = table_with(vec![], vec![(RouteMethod::Get, "/", failing)]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Failed);
        assert_eq!(ctx.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_handler_panic_defaults_to_500() {
        let failing = handler(|ctx| {
            Box::pin(async move {
                if ctx.header("x-survive").is_none() {
                    panic!("unexpected");
                }
                Ok(ctx.end())
            })
        });
        let table = table_with(vec![], vec![(RouteMethod::Get, "/", failing)]);

        let mut ctx = test_context(Method::GET, "/", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Failed);
        assert_eq!(ctx.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_abort_is_not_a_fresh_500() {
        let guarded = handler(|ctx| {
            Box::pin(async move {
                let id = ctx.param("id").unwrap_or_default().to_string();
                ctx.ensure(id == "1", StatusCode::NOT_FOUND, "no such user", None)?;
                Ok(ctx.text("found"))
            })
        });
        let table = table_with(vec![], vec![(RouteMethod::Get, "/user/:id", guarded)]);

        let mut ctx = test_context(Method::GET, "/user/2", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Halted);
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.response().body_bytes(), Some(&br#"{"message":"no such user"}"#[..]));

        let mut ctx = test_context(Method::GET, "/user/1", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Completed);
    }

    #[tokio::test]
    async fn test_params_empty_for_wildcard_route() {
        let table = table_with(
            vec![],
            vec![(RouteMethod::Any, "/*", handler(|ctx| Box::pin(async move { Ok(ctx.end()) })))],
        );
        let mut ctx = test_context(Method::PATCH, "/any/thing", &[], "");
        assert_eq!(dispatch(&table, &mut ctx).await, DispatchOutcome::Completed);
        assert!(ctx.params().is_empty());
    }
}
