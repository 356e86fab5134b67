//! In-process tests of the observability pipeline.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use erebus::config::ServiceConfig;
use erebus::http::handlers::ALIVE_MESSAGE;
use erebus::{HttpServer, Metrics};
use serde_json::Value;
use tower::ServiceExt;

mod common;

fn setup() -> (Router, Metrics) {
    let metrics = Metrics::new().unwrap();
    let router = common::test_router(&metrics, &ServiceConfig::default());
    (router, metrics)
}

fn parse_field(record: &Value, field: &str) -> Value {
    serde_json::from_str(record[field].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn healthz_without_request_id_logs_generated_id() {
    let (logs, _guard) = common::capture_logs();
    let metrics = Metrics::new().unwrap();
    let router = HttpServer::new(ServiceConfig::default(), common::test_build(), metrics).router();

    let response = router
        .oneshot(Request::get("/api/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let header_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let body = common::body_bytes(response.into_body()).await;
    assert_eq!(&body[..], ALIVE_MESSAGE.as_bytes());

    let records = logs.access_records();
    assert_eq!(records.len(), 1, "exactly one record per request");
    let record = &records[0];
    assert!(!header_id.is_empty());
    assert_eq!(record["request_id"], header_id.as_str());
    assert_eq!(record["method"], "GET");
    assert_eq!(record["path"], "/api/healthz");
    assert_eq!(record["status"], 200);
    assert!(record["latency_us"].as_u64().is_some());
    assert_eq!(record["response_body"], ALIVE_MESSAGE);
}

#[tokio::test]
async fn login_body_is_masked_in_logs_but_not_for_handler() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();
    let payload = r#"{"username":"alice","password":"hunter2"}"#;

    let response = router
        .oneshot(
            Request::post("/api/echo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = common::body_bytes(response.into_body()).await;
    assert_eq!(&echoed[..], payload.as_bytes(), "handler must see the real body");

    let records = logs.access_records();
    assert_eq!(records.len(), 1);
    let masked = r#"{"username":"alice","password":"*****"}"#;
    assert_eq!(records[0]["request_body"], masked);
    assert_eq!(records[0]["response_body"], masked);
    assert!(!logs.text().contains("hunter2"));
}

#[tokio::test]
async fn put_bodies_are_masked_too() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();

    let response = router
        .oneshot(
            Request::put("/api/echo")
                .body(Body::from(r#"{"config":{"ApiKey":"k-123","name":"svc"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    common::body_bytes(response.into_body()).await;

    let record = &logs.access_records()[0];
    assert_eq!(
        record["request_body"],
        r#"{"config":{"ApiKey":"*****","name":"svc"}}"#
    );
}

#[tokio::test]
async fn non_json_body_is_logged_verbatim() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();

    let response = router
        .oneshot(Request::post("/api/echo").body(Body::from("plain text")).unwrap())
        .await
        .unwrap();
    common::body_bytes(response.into_body()).await;

    let record = &logs.access_records()[0];
    assert_eq!(record["request_body"], "plain text");
    assert_eq!(record["response_body"], "plain text");
}

#[tokio::test]
async fn authorization_header_is_masked() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();

    let response = router
        .oneshot(
            Request::get("/api/healthz")
                .header(header::AUTHORIZATION, "Bearer xyz")
                .header(header::USER_AGENT, "pipeline-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    common::body_bytes(response.into_body()).await;

    let record = &logs.access_records()[0];
    let headers = parse_field(record, "headers");
    assert_eq!(headers["authorization"], serde_json::json!(["*****"]));
    assert_eq!(headers["user-agent"], serde_json::json!(["pipeline-test"]));
    assert!(!logs.text().contains("xyz"));
}

#[tokio::test]
async fn sensitive_query_parameters_are_masked() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();

    let response = router
        .oneshot(
            Request::get("/api/healthz?Token=abc&page=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    common::body_bytes(response.into_body()).await;

    let query = parse_field(&logs.access_records()[0], "query_params");
    assert_eq!(query["Token"], serde_json::json!(["*****"]));
    assert_eq!(query["page"], serde_json::json!(["2"]));
}

#[tokio::test]
async fn inbound_request_id_is_reused_everywhere() {
    let (logs, _guard) = common::capture_logs();
    let (router, metrics) = setup();

    let response = router
        .oneshot(
            Request::get("/api/version")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
    let body: Value = serde_json::from_slice(&common::body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body["req_id"], "req-42");
    assert_eq!(body["version"], "v0.0.1");
    assert_eq!(body["commit"], "test");
    assert_eq!(body["date"], "unknown");

    assert_eq!(logs.access_records()[0]["request_id"], "req-42");
    assert!(logs
        .records()
        .iter()
        .any(|r| r["message"] == "version request" && r["req_id"] == "req-42"));
    assert!(metrics.render().contains(r#"request_id="req-42""#));
}

#[tokio::test]
async fn panic_yields_500_and_next_request_succeeds() {
    let (logs, _guard) = common::capture_logs();
    let (router, metrics) = setup();

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/panic?page=3&token=abc")
                .header(header::AUTHORIZATION, "Bearer xyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let body = common::body_bytes(response.into_body()).await;
    let body_text = String::from_utf8_lossy(&body).into_owned();
    assert!(!body_text.contains("boom"), "no internal detail leaks");
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "internal server error");
    assert_eq!(json["req_id"], request_id.as_str());

    let response = router
        .oneshot(Request::get("/api/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    common::body_bytes(response.into_body()).await;

    let records = logs.access_records();
    assert_eq!(records.len(), 2);
    let panicked = &records[0];
    assert_eq!(panicked["status"], 500);
    assert_eq!(panicked["level"], "ERROR");
    assert_eq!(panicked["request_id"], request_id.as_str());
    assert_eq!(panicked["method"], "GET");
    assert_eq!(panicked["path"], "/api/panic");
    assert_eq!(panicked["client_ip"], "");
    assert_eq!(panicked["request_body"], "");
    assert_eq!(panicked["response_body"], body_text.as_str());
    assert!(panicked["latency_us"].as_u64().is_some());
    assert!(panicked["panic"].as_str().unwrap().contains("boom"));
    let query = parse_field(panicked, "query_params");
    assert_eq!(query["token"], serde_json::json!(["*****"]));
    assert_eq!(query["page"], serde_json::json!(["3"]));
    let headers = parse_field(panicked, "headers");
    assert_eq!(headers["authorization"], serde_json::json!(["*****"]));
    assert!(!logs.text().contains("xyz"));
    assert_eq!(records[1]["status"], 200);

    let rendered = metrics.render();
    assert_eq!(common::metric_total(&rendered, "erebus_http_panics_total"), 1.0);
    assert_eq!(common::metric_total(&rendered, "erebus_http_errors_5xx_total"), 1.0);
    assert_eq!(common::metric_total(&rendered, "erebus_http_requests_total"), 2.0);
}

#[tokio::test]
async fn panic_record_carries_masked_request_body() {
    let (logs, _guard) = common::capture_logs();
    let (router, _metrics) = setup();

    let response = router
        .oneshot(
            Request::post("/api/panic")
                .body(Body::from(r#"{"user":"bob","password":"hunter2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    common::body_bytes(response.into_body()).await;

    let records = logs.access_records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0]["request_body"],
        r#"{"user":"bob","password":"*****"}"#
    );
    assert!(!logs.text().contains("hunter2"));
}

#[tokio::test]
async fn slow_handler_times_out_with_408() {
    let (logs, _guard) = common::capture_logs();
    let metrics = Metrics::new().unwrap();
    let mut config = ServiceConfig::default();
    config.server.request_timeout_secs = 1;
    let router = common::test_router(&metrics, &config);

    let response = router
        .oneshot(Request::get("/api/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    common::body_bytes(response.into_body()).await;

    let records = logs.access_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], 408);
    assert_eq!(records[0]["path"], "/api/slow");

    let rendered = metrics.render();
    assert_eq!(common::metric_total(&rendered, "erebus_http_errors_4xx_total"), 1.0);
    assert_eq!(common::metric_total(&rendered, "erebus_http_requests_total"), 1.0);
}

#[tokio::test]
async fn unknown_route_counts_as_4xx() {
    let (router, metrics) = setup();

    let response = router
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let rendered = metrics.render();
    assert_eq!(common::metric_total(&rendered, "erebus_http_errors_4xx_total"), 1.0);
    assert!(rendered.contains(r#"status="Not Found""#));
}

#[tokio::test]
async fn oversized_body_reaches_handler_and_is_counted() {
    let (logs, _guard) = common::capture_logs();
    let metrics = Metrics::new().unwrap();
    let mut config = ServiceConfig::default();
    config.server.max_body_bytes = 8;
    let router = common::test_router(&metrics, &config);
    let payload = r#"{"password":"hunter2-and-more"}"#;

    let response = router
        .oneshot(Request::post("/api/echo").body(Body::from(payload)).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed = common::body_bytes(response.into_body()).await;
    assert_eq!(&echoed[..], payload.as_bytes());

    let records = logs.access_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], 200);
    assert_eq!(
        records[0]["request_body"],
        format!("[{} bytes, not logged]", payload.len()).as_str()
    );
    assert!(!logs.text().contains("hunter2"));

    let rendered = metrics.render();
    assert_eq!(common::metric_total(&rendered, "erebus_http_requests_total"), 1.0);
}

#[tokio::test]
async fn oversized_chunked_body_reaches_handler_intact() {
    let (logs, _guard) = common::capture_logs();
    let metrics = Metrics::new().unwrap();
    let mut config = ServiceConfig::default();
    config.server.max_body_bytes = 8;
    config.logging.max_logged_body_bytes = 8;
    let router = common::test_router(&metrics, &config);

    let chunks: Vec<Result<&'static str, std::io::Error>> =
        vec![Ok("chunk-one|"), Ok("chunk-two|"), Ok("chunk-three")];
    let response = router
        .oneshot(
            Request::put("/api/echo")
                .body(Body::from_stream(futures_util::stream::iter(chunks)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed = common::body_bytes(response.into_body()).await;
    assert_eq!(&echoed[..], b"chunk-one|chunk-two|chunk-three");

    let record = &logs.access_records()[0];
    assert_eq!(record["request_body"], "[31 bytes, not logged]");
    assert_eq!(record["response_body"], "[31 bytes, not logged]");
}

#[tokio::test]
async fn metrics_endpoint_serves_exposition_text() {
    let metrics = Metrics::new().unwrap();
    metrics.set_build_info(&common::test_build());
    let router = HttpServer::new(
        ServiceConfig::default(),
        common::test_build(),
        metrics.clone(),
    )
    .router();

    let response = router
        .clone()
        .oneshot(Request::get("/api/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    common::body_bytes(response.into_body()).await;

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(common::body_bytes(response.into_body()).await.to_vec()).unwrap();

    assert!(text.contains("erebus_http_requests_total{"));
    assert!(text.contains(r#"path="/api/healthz""#));
    assert!(text.contains("erebus_build_info{"));
    assert!(text.contains("erebus_http_request_duration_seconds_bucket"));
}
