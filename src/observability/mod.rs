//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP middleware produces:
//!     → logging.rs (one structured record per request)
//!     → masking.rs (sensitive fields redacted before anything is logged)
//!     → metrics.rs (counters, histograms, build info)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape on /metrics)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every record and series
//! - Metrics are cheap (atomic increments)
//! - Observability never fails a request

pub mod logging;
pub mod masking;
pub mod metrics;

pub use self::metrics::{Metrics, MetricsError};
