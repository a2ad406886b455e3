//! Routewalk: request routing and plugin dispatch on Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────▶ http::server (catch-all, request id, body buffer)
//!                 │
//!                 ▼
//!             context::RequestContext (fresh per request)
//!                 │
//!                 ▼
//!             routing::RouterTable::resolve
//!                 │   matching plugins + first matching route
//!                 ▼
//!             dispatch::walkthrough (plugins in order → terminal handler)
//!                 │
//!                 ▼
//!     ◀────── http::response (finalized context → wire response)
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use app::{App, RouteError, RouteSpec};
pub use config::ServerConfig;
pub use context::{Finalized, Payload, RequestContext};
pub use dispatch::{handler, plugin, DispatchOutcome, HandlerError, HandlerResult, Next, PluginResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
