//! Panic isolation.
//!
//! A panic anywhere below this layer is confined to the request that caused
//! it: the client gets a generic 500 and the server keeps serving.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use serde_json::{json, Value};

use crate::http::middleware::access_log::{AccessRecord, RequestBodySlot};
use crate::observability::metrics::{Metrics, RequestSample};

pub async fn fault_isolation_middleware(
    State(metrics): State<Metrics>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // The request half is captured here because nothing inside survives a panic.
    let record = AccessRecord::capture(&request);
    let request_body = RequestBodySlot::default();
    request.extensions_mut().insert(request_body.clone());

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let body = internal_error_body(&record.request_id);

            record.emit_panic(
                status,
                &request_body.rendered(),
                &body.to_string(),
                panic_message(payload.as_ref()),
            );

            let method = record.method.as_str();
            metrics.record_panic(&record.path, method);
            metrics.record_request(&RequestSample {
                path: &record.path,
                method,
                status,
                request_id: &record.request_id,
                elapsed: record.elapsed(),
            });

            (status, Json(body)).into_response()
        }
    }
}

/// Generic 500 body; never carries panic details.
fn internal_error_body(request_id: &str) -> Value {
    json!({
        "error": "internal server error",
        "req_id": request_id,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
