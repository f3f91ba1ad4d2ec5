//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log stream
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! Request IDs (`x-request-id`) are attached by the HTTP layer and show up in
//! the `TraceLayer` spans.

pub mod logging;
pub mod metrics;
