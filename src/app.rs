//! Application: the registration API over one [`RouterTable`].
//!
//! # Responsibilities
//! - Register plugins (global or per template) and terminal routes
//! - Own the table; no ambient registry
//! - Run one buffered request through the pipeline in-process
//!
//! # Design Decisions
//! - Registration order is dispatch order for plugins and precedence for routes
//! - Invalid templates are rejected at registration, not at request time

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::context::RequestContext;
use crate::dispatch::{self, DispatchOutcome, Handler, HandlerResult, Next, Plugin, PluginResult};
use crate::http::response::into_response;
use crate::routing::{PatternError, RouteEntry, RouteMethod, RouterTable, WILDCARD};

/// Error raised while registering a plugin or route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A route ready to be registered, for bulk registration.
pub struct RouteSpec {
    pub method: RouteMethod,
    pub template: String,
    pub handler: Arc<dyn Handler>,
}

impl RouteSpec {
    pub fn new(method: RouteMethod, template: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            method,
            template: template.into(),
            handler,
        }
    }
}

macro_rules! method_routes {
    ($($(#[$doc:meta])* $name:ident => $method:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<F>(&mut self, template: &str, handler: F) -> Result<&mut Self, RouteError>
            where
                F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerResult>
                    + Send
                    + Sync
                    + 'static,
            {
                self.route(RouteSpec::new(RouteMethod::$method, template, Arc::new(handler)))
            }
        )*
    };
}

/// Plugins and routes of one server.
#[derive(Debug, Default)]
pub struct App {
    table: RouterTable,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin for every request.
    pub fn plugin<F>(&mut self, plugin: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut RequestContext, Next) -> BoxFuture<'a, PluginResult>
            + Send
            + Sync
            + 'static,
    {
        self.use_plugin(WILDCARD, Arc::new(plugin))
    }

    /// Register several global plugins, in order.
    pub fn plugins<I>(&mut self, plugins: I) -> Result<&mut Self, RouteError>
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        for plugin in plugins {
            self.use_plugin(WILDCARD, plugin)?;
        }
        Ok(self)
    }

    /// Register a plugin for requests of any method matching `template`.
    pub fn use_at<F>(&mut self, template: &str, plugin: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut RequestContext, Next) -> BoxFuture<'a, PluginResult>
            + Send
            + Sync
            + 'static,
    {
        self.use_plugin(template, Arc::new(plugin))
    }

    pub fn use_plugin(&mut self, template: &str, plugin: Arc<dyn Plugin>) -> Result<&mut Self, RouteError> {
        self.table
            .add_plugin(RouteEntry::new(RouteMethod::Any, template, plugin)?);
        Ok(self)
    }

    method_routes! {
        /// Route for any method.
        all => Any,
        get => Get,
        head => Head,
        post => Post,
        put => Put,
        delete => Delete,
        patch => Patch,
        options => Options,
    }

    pub fn route(&mut self, spec: RouteSpec) -> Result<&mut Self, RouteError> {
        self.table
            .add_route(RouteEntry::new(spec.method, &spec.template, spec.handler)?);
        Ok(self)
    }

    pub fn routes<I>(&mut self, specs: I) -> Result<&mut Self, RouteError>
    where
        I: IntoIterator<Item = RouteSpec>,
    {
        for spec in specs {
            self.route(spec)?;
        }
        Ok(self)
    }

    pub fn table(&self) -> &RouterTable {
        &self.table
    }

    /// Run one fully buffered request through the pipeline.
    pub async fn handle(
        &self,
        request: Request<Bytes>,
        peer: Option<SocketAddr>,
    ) -> (DispatchOutcome, Response<Body>) {
        let mut ctx = RequestContext::from_request(request, peer);
        let outcome = dispatch::dispatch(&self.table, &mut ctx).await;
        (outcome, into_response(ctx))
    }
}
