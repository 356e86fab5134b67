//! Metrics collection and exposition.
//!
//! # Metrics
//! - `erebus_http_requests_total` (counter): requests by path, method, status, request id
//! - `erebus_http_request_duration_seconds` (histogram): latency distribution
//! - `erebus_http_errors_4xx_total` / `erebus_http_errors_5xx_total` (counters)
//! - `erebus_http_panics_total` (counter): handler panics by path, method
//! - `erebus_build_info` (gauge): 1 for the running build
//!
//! # Design Decisions
//! - Each [`Metrics`] owns its own Prometheus recorder, so tests get isolated
//!   registries and nothing depends on a global recorder being installed
//! - Updates are atomic inside the recorder; callers never lock
//! - Histogram buckets are the Prometheus client defaults

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use thiserror::Error;

use crate::version::BuildInfo;

pub const REQUESTS_TOTAL: &str = "erebus_http_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "erebus_http_request_duration_seconds";
pub const ERRORS_4XX_TOTAL: &str = "erebus_http_errors_4xx_total";
pub const ERRORS_5XX_TOTAL: &str = "erebus_http_errors_5xx_total";
pub const PANICS_TOTAL: &str = "erebus_http_panics_total";
pub const BUILD_INFO: &str = "erebus_build_info";

/// Latency buckets in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Error building the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid histogram buckets: {0}")]
    Buckets(#[from] BuildError),
}

/// One finished request, as seen by the metrics layer.
#[derive(Debug, Clone)]
pub struct RequestSample<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub status: StatusCode,
    pub request_id: &'a str,
    pub elapsed: Duration,
}

/// Process-wide metric registry, cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Metrics {
    /// Create a registry with all series described.
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
                &DEFAULT_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests");
            describe_histogram!(
                REQUEST_DURATION_SECONDS,
                Unit::Seconds,
                "Duration of HTTP requests"
            );
            describe_counter!(ERRORS_4XX_TOTAL, "Total number of client errors (4xx)");
            describe_counter!(ERRORS_5XX_TOTAL, "Total number of server errors (5xx)");
            describe_counter!(PANICS_TOTAL, "Total number of recovered handler panics");
            describe_gauge!(BUILD_INFO, "Erebus build info: 1 for current build");
        });

        Ok(Self {
            inner: Arc::new(MetricsInner { recorder, handle }),
        })
    }

    /// Publish the build info gauge.
    pub fn set_build_info(&self, info: &BuildInfo) {
        let labels = vec![
            Label::new("commit", info.commit.clone()),
            Label::new("version", info.version.clone()),
            Label::new("date", info.date.clone()),
        ];
        metrics::with_local_recorder(&self.inner.recorder, || {
            gauge!(BUILD_INFO, labels).set(1.0);
        });
    }

    /// Record a finished request.
    pub fn record_request(&self, sample: &RequestSample<'_>) {
        let labels = vec![
            Label::new("path", sample.path.to_string()),
            Label::new("method", sample.method.to_string()),
            Label::new("status", status_text(sample.status)),
            Label::new("request_id", sample.request_id.to_string()),
        ];
        let error_labels = vec![
            Label::new("path", sample.path.to_string()),
            Label::new("method", sample.method.to_string()),
            Label::new("request_id", sample.request_id.to_string()),
        ];

        metrics::with_local_recorder(&self.inner.recorder, || {
            counter!(REQUESTS_TOTAL, labels.clone()).increment(1);
            histogram!(REQUEST_DURATION_SECONDS, labels).record(sample.elapsed.as_secs_f64());

            if sample.status.is_client_error() {
                counter!(ERRORS_4XX_TOTAL, error_labels).increment(1);
            } else if sample.status.is_server_error() {
                counter!(ERRORS_5XX_TOTAL, error_labels).increment(1);
            }
        });
    }

    /// Count a panic recovered while handling `method path`.
    pub fn record_panic(&self, path: &str, method: &str) {
        let labels = vec![
            Label::new("path", path.to_string()),
            Label::new("method", method.to_string()),
        ];
        metrics::with_local_recorder(&self.inner.recorder, || {
            counter!(PANICS_TOTAL, labels).increment(1);
        });
    }

    /// Render all series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.inner.handle.render()
    }
}

/// Status label value: the canonical reason phrase, or the bare code.
pub fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}
