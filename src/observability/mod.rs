//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server shell and dispatch produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the trace layer span
//! - Metric recording is a no-op until an exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
