//! Terminal handlers: liveness, version and metrics scrape.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::http::request::RequestId;
use crate::http::server::AppState;

/// Liveness body returned by `/api/healthz`.
pub const ALIVE_MESSAGE: &str = "Erebus is alive 🚀";

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub commit: String,
    pub date: String,
    pub req_id: String,
}

pub async fn healthz() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ALIVE_MESSAGE,
    )
}

pub async fn version(State(state): State<AppState>, request_id: RequestId) -> Json<VersionResponse> {
    let build = &state.build;

    tracing::info!(
        version = %build.version,
        commit = %build.commit,
        date = %build.date,
        req_id = %request_id,
        "version request"
    );

    Json(VersionResponse {
        version: build.version.clone(),
        commit: build.commit.clone(),
        date: build.date.clone(),
        req_id: request_id.to_string(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
