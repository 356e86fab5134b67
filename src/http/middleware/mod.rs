//! Request observability pipeline.
//!
//! # Layer Order
//! ```text
//! request  → RequestIdLayer        (assign / propagate x-request-id)
//!          → fault_isolation       (panic → generic 500)
//!          → access_log            (one masked record per request, 413 on oversized bodies)
//!          → metrics               (counters, latency histogram)
//!          → timeout               (408 after request_timeout_secs)
//!          → handler
//! response ← same layers in reverse
//! ```

pub mod access_log;
pub mod fault;
pub mod metrics;

use std::time::Duration;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::timeout::TimeoutLayer;

use crate::config::ServiceConfig;
use crate::http::request::RequestIdLayer;
use crate::observability::Metrics;

pub use access_log::{access_log_middleware, AccessLogSettings};
pub use fault::fault_isolation_middleware;
pub use self::metrics::metrics_middleware;

/// Wrap `router` in the full observability pipeline.
#[allow(deprecated)]
pub fn apply_pipeline(router: Router, metrics: Metrics, config: &ServiceConfig) -> Router {
    router
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(from_fn_with_state(metrics.clone(), metrics_middleware))
        .layer(from_fn_with_state(
            AccessLogSettings::from(config),
            access_log_middleware,
        ))
        .layer(from_fn_with_state(metrics, fault_isolation_middleware))
        .layer(RequestIdLayer)
}
