//! Request instrumentation.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::http::request::RequestIdExt;
use crate::observability::metrics::{Metrics, RequestSample};

/// Count the request and observe its latency once the handler has answered.
pub async fn metrics_middleware(
    State(metrics): State<Metrics>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    metrics.record_request(&RequestSample {
        path: &path,
        method: &method,
        status: response.status(),
        request_id: &request_id,
        elapsed: start.elapsed(),
    });

    response
}
