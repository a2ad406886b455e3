//! HTTP shell around the dispatch engine.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum catch-all, request id, trace layer)
//!     → buffer the full request body (size limit from config)
//!     → App::handle (RequestContext → dispatch)
//!     → response.rs (finalized context → wire response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
