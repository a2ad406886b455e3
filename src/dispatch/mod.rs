//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext + RouterTable
//!     → walkthrough.rs::dispatch (resolve, store params)
//!     → matched plugins in registration order (handler.rs: Plugin + Next)
//!     → terminal handler (handler.rs: Handler) or 404
//!     → Return: DispatchOutcome, response always finalized
//! ```
//!
//! # Error Mapping
//! - Plugin breaks the continuation contract → 418
//! - No route matched → 404
//! - Handler hands back a foreign response token → 500
//! - Plugin fails or panics → 500
//! - Handler fails or panics → explicitly set status, else 500
//! - `abort` / `ensure` → the handler's own JSON response, dispatch stops

pub mod handler;
pub mod walkthrough;

pub use handler::{
    handler, plugin, BoxError, Handler, HandlerError, HandlerResult, Next, Plugin, PluginResult,
    Proceed, Step,
};
pub use walkthrough::{dispatch, walkthrough, DispatchOutcome};
