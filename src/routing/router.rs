//! Route lookup.
//!
//! # Responsibilities
//! - Store plugins and routes in registration order
//! - Select every matching plugin for a request
//! - Select the first matching route, with its params
//!
//! # Design Decisions
//! - Append-only; shared read-only (via `Arc`) once the server starts
//! - O(n) scan over both lists, which is fine for typical route counts
//! - Explicit `None` route rather than a silent default

use std::sync::Arc;

use axum::http::Method;

use crate::context::Params;
use crate::dispatch::{Handler, Plugin};
use crate::routing::entry::RouteEntry;

pub type PluginEntry = RouteEntry<Arc<dyn Plugin>>;
pub type HandlerEntry = RouteEntry<Arc<dyn Handler>>;

/// The matched terminal route and the params it extracted.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub entry: &'a HandlerEntry,
    pub params: Params,
}

/// Everything a request dispatches through.
#[derive(Debug, Default)]
pub struct Resolution<'a> {
    /// Matching plugins, in registration order.
    pub plugins: Vec<&'a PluginEntry>,
    /// First matching route, if any.
    pub route: Option<RouteMatch<'a>>,
}

/// Ordered plugin and route registries.
#[derive(Default)]
pub struct RouterTable {
    plugins: Vec<PluginEntry>,
    routes: Vec<HandlerEntry>,
}

impl RouterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin(&mut self, entry: PluginEntry) {
        tracing::debug!(method = %entry.method(), template = entry.template(), "Plugin registered");
        self.plugins.push(entry);
    }

    pub fn add_route(&mut self, entry: HandlerEntry) {
        tracing::debug!(method = %entry.method(), template = entry.template(), "Route registered");
        self.routes.push(entry);
    }

    pub fn plugins(&self) -> &[PluginEntry] {
        &self.plugins
    }

    pub fn routes(&self) -> &[HandlerEntry] {
        &self.routes
    }

    /// Resolve the plugins and the route for a request.
    pub fn resolve(&self, method: &Method, url: &str) -> Resolution<'_> {
        let plugins = self
            .plugins
            .iter()
            .filter(|entry| entry.matches(method, url).is_some())
            .collect();

        let route = self.routes.iter().find_map(|entry| {
            entry
                .matches(method, url)
                .map(|params| RouteMatch { entry, params })
        });

        Resolution { plugins, route }
    }
}

impl std::fmt::Debug for RouterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterTable")
            .field("plugins", &self.plugins)
            .field("routes", &self.routes)
            .finish()
    }
}
