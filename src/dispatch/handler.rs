//! Plugin and handler shapes.
//!
//! A plugin receives the context and a [`Next`] capability. It either hands
//! the capability back through [`Next::proceed`] to let dispatch continue, or
//! finalizes the response and returns the [`Finalized`] token. A terminal
//! handler has no continuation and must return a `Finalized` token.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::context::{ContextId, Finalized, RequestContext, ResponseError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type PluginResult = Result<Step, HandlerError>;
pub type HandlerResult = Result<Finalized, HandlerError>;

/// Failure or early exit of a plugin or handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The response was already sent; stop dispatch without touching it.
    #[error("dispatch halted after the response was sent")]
    Halted(Finalized),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("{0}")]
    Failed(BoxError),
}

impl HandlerError {
    pub fn failed(error: impl Into<BoxError>) -> Self {
        HandlerError::Failed(error.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        HandlerError::Failed(Box::new(error))
    }
}

/// The capability to continue past the current plugin.
#[derive(Debug)]
pub struct Next {
    context: ContextId,
    position: usize,
}

impl Next {
    pub(crate) fn new(context: ContextId, position: usize) -> Self {
        Self { context, position }
    }

    /// Continue with the next plugin (or the terminal handler).
    pub fn proceed(self) -> Step {
        Step::Continue(Proceed {
            context: self.context,
            position: self.position,
        })
    }
}

/// Token returned through [`Next::proceed`].
#[derive(Debug, PartialEq, Eq)]
pub struct Proceed {
    pub(crate) context: ContextId,
    pub(crate) position: usize,
}

/// What a plugin hands back to the dispatcher.
#[derive(Debug)]
pub enum Step {
    Continue(Proceed),
    Finished(Finalized),
}

impl From<Finalized> for Step {
    fn from(token: Finalized) -> Self {
        Step::Finished(token)
    }
}

/// Middleware run for every matching request, in registration order.
pub trait Plugin: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, next: Next) -> BoxFuture<'a, PluginResult>;
}

impl<F> Plugin for F
where
    F: for<'a> Fn(&'a mut RequestContext, Next) -> BoxFuture<'a, PluginResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, next: Next) -> BoxFuture<'a, PluginResult> {
        (self)(ctx, next)
    }
}

/// Terminal handler for a route.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
        (self)(ctx)
    }
}

/// Box a plugin closure. Pins down the higher-ranked closure signature.
///
/// ```ignore
/// let log = plugin(|ctx, next| Box::pin(async move {
///     tracing::info!(url = ctx.url(), "hit");
///     Ok(next.proceed())
/// }));
/// ```
pub fn plugin<F>(f: F) -> Arc<dyn Plugin>
where
    F: for<'a> Fn(&'a mut RequestContext, Next) -> BoxFuture<'a, PluginResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a handler closure.
///
/// ```ignore
/// let hello = handler(|ctx| Box::pin(async move { Ok(ctx.text("hello")) }));
/// ```
pub fn handler<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}
