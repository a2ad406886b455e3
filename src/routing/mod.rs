//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (App):
//!     template → pattern.rs (compile to regex + ordered names)
//!     → entry.rs (bind method filter + handler)
//!     → router.rs (append to plugins or routes)
//!
//! Incoming Request (method, url)
//!     → router.rs (resolve)
//!     → Return: matching plugins (ordered) + first matching route with params
//! ```
//!
//! # Design Decisions
//! - Entries compiled at registration, immutable at runtime
//! - Deterministic: same input always resolves to the same entries
//! - First registered route wins; every matching plugin runs

pub mod entry;
pub mod pattern;
pub mod router;

pub use entry::{RouteEntry, RouteMethod};
pub use pattern::{PathPattern, PatternError, PatternMatch, WILDCARD};
pub use router::{HandlerEntry, PluginEntry, Resolution, RouteMatch, RouterTable};
