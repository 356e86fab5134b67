//! Shared utilities for pipeline and server tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    routing::{get, post},
    Router,
};
use erebus::config::ServiceConfig;
use erebus::http::handlers;
use erebus::http::middleware::apply_pipeline;
use erebus::http::AppState;
use erebus::{BuildInfo, Metrics};
use serde_json::Value;

pub fn test_build() -> BuildInfo {
    BuildInfo {
        version: "v0.0.1".into(),
        commit: "test".into(),
        date: "unknown".into(),
    }
}

async fn echo(body: Bytes) -> Bytes {
    body
}

async fn explode() -> String {
    panic!("boom: internal detail")
}

async fn stall() -> &'static str {
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    "too late"
}

/// The production routes plus `/api/echo` (POST/PUT, echoes the body),
/// `/api/panic` and `/api/slow` (answers after 5s), wrapped in the full pipeline.
pub fn test_router(metrics: &Metrics, config: &ServiceConfig) -> Router {
    let state = AppState {
        metrics: metrics.clone(),
        build: test_build(),
    };
    let routes = Router::new()
        .route("/api/healthz", get(handlers::healthz))
        .route("/api/version", get(handlers::version))
        .route("/metrics", get(handlers::metrics))
        .route("/api/echo", post(echo).put(echo))
        .route("/api/panic", get(explode).post(explode))
        .route("/api/slow", get(stall))
        .with_state(state);
    apply_pipeline(routes, metrics.clone(), config)
}

pub async fn body_bytes(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}

/// Sum every sample of `name` (a counter) in a Prometheus text rendering.
pub fn metric_total(rendered: &str, name: &str) -> f64 {
    rendered
        .lines()
        .filter(|line| line.starts_with(&format!("{name}{{")) || line.starts_with(&format!("{name} ")))
        .filter_map(|line| line.rsplit(' ').next())
        .filter_map(|value| value.parse::<f64>().ok())
        .sum()
}

/// In-memory sink for JSON log lines.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn records(&self) -> Vec<Value> {
        self.text()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Records emitted for finished requests.
    pub fn access_records(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|record| record["message"] == "HTTP request")
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Wait until `count` access records have been written, or give up after 2s.
pub async fn wait_for_access_records(logs: &LogCapture, count: usize) -> Vec<Value> {
    for _ in 0..100 {
        let records = logs.access_records();
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    logs.access_records()
}

/// Capture JSON logs emitted on the current thread until the guard drops.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_max_level(tracing::Level::INFO)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
