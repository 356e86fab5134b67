//! Structured request logging.
//!
//! Emits one `HTTP request` record per request with headers, query
//! parameters and JSON bodies masked. Request bodies of POST/PUT are
//! buffered once, masked for the log, and handed to the handler intact.
//! Bodies over the buffering limit stream through and are only counted;
//! the logger never answers a request itself.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, Stream, StreamExt};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;

use crate::config::ServiceConfig;
use crate::http::request::RequestIdExt;
use crate::http::response::{CapturedBody, ObservedBody};
use crate::observability::masking::{mask_json_bytes, mask_multimap};

/// Limits applied by the access logger.
#[derive(Debug, Clone, Copy)]
pub struct AccessLogSettings {
    /// Largest request body buffered for masking; larger bodies stream through unlogged.
    pub max_body_bytes: usize,
    /// Largest response body copied into a record.
    pub max_logged_body_bytes: usize,
}

impl From<&ServiceConfig> for AccessLogSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_body_bytes: config.server.max_body_bytes,
            max_logged_body_bytes: config.logging.max_logged_body_bytes,
        }
    }
}

/// Request body as it appears in a record.
#[derive(Debug, Clone)]
pub(crate) enum LoggedBody {
    Masked(Bytes),
    /// Streamed to the handler unbuffered; holds the bytes seen so far.
    Skipped(Arc<AtomicUsize>),
}

impl LoggedBody {
    fn empty() -> Self {
        Self::Masked(Bytes::new())
    }

    fn render(&self) -> String {
        match self {
            Self::Masked(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Skipped(seen) => not_logged(seen.load(Ordering::Relaxed)),
        }
    }
}

/// Request extension through which the logger publishes the logged request
/// body to outer layers.
#[derive(Debug, Clone, Default)]
pub struct RequestBodySlot(Arc<OnceLock<LoggedBody>>);

impl RequestBodySlot {
    fn fill(&self, body: &LoggedBody) {
        let _ = self.0.set(body.clone());
    }

    /// The logged request body, or `""` if the logger never saw the request.
    pub(crate) fn rendered(&self) -> String {
        self.0.get().map(LoggedBody::render).unwrap_or_default()
    }
}

/// Request half of an access record, captured before the request moves on.
pub(crate) struct AccessRecord {
    start: Instant,
    pub(crate) request_id: String,
    pub(crate) method: Method,
    pub(crate) path: String,
    query_params: BTreeMap<String, Vec<String>>,
    headers: BTreeMap<String, Vec<String>>,
    client_ip: String,
}

impl AccessRecord {
    pub(crate) fn capture<B>(request: &Request<B>) -> Self {
        Self {
            start: Instant::now(),
            request_id: request.request_id().to_string(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query_params: mask_multimap(query_map(request.uri().query())),
            headers: mask_multimap(header_map(request.headers())),
            client_ip: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub(crate) fn emit(&self, status: StatusCode, request_body: &str, response_body: &str) {
        let latency = self.elapsed();
        tracing::info!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            query_params = %to_json(&self.query_params),
            headers = %to_json(&self.headers),
            client_ip = %self.client_ip,
            status = status.as_u16(),
            latency = ?latency,
            latency_us = micros(latency),
            request_body = %request_body,
            response_body = %response_body,
            "HTTP request"
        );
    }

    /// Same record at error level, for a request whose handler panicked.
    pub(crate) fn emit_panic(
        &self,
        status: StatusCode,
        request_body: &str,
        response_body: &str,
        panic: &str,
    ) {
        let latency = self.elapsed();
        tracing::error!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            query_params = %to_json(&self.query_params),
            headers = %to_json(&self.headers),
            client_ip = %self.client_ip,
            status = status.as_u16(),
            latency = ?latency,
            latency_us = micros(latency),
            request_body = %request_body,
            response_body = %response_body,
            panic = %panic,
            "HTTP request"
        );
    }
}

pub async fn access_log_middleware(
    State(settings): State<AccessLogSettings>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let record = AccessRecord::capture(&request);
    let slot = request.extensions().get::<RequestBodySlot>().cloned();

    let (request, request_body) = tap_body(request, settings.max_body_bytes).await;
    if let Some(slot) = slot {
        slot.fill(&request_body);
    }

    let (parts, body) = next.run(request).await.into_parts();
    let status = parts.status;
    let observed = ObservedBody::new(body, settings.max_logged_body_bytes, move |captured| {
        record.emit(
            status,
            &request_body.render(),
            &loggable_response_body(&captured),
        )
    });
    Response::from_parts(parts, Body::new(observed))
}

/// Buffer a POST/PUT body of at most `limit` bytes for masking and restore it
/// onto the request. Longer bodies, and bodies that fail mid-read, go on to
/// the handler as streams with the prefix read so far put back in front.
async fn tap_body(request: Request<Body>, limit: usize) -> (Request<Body>, LoggedBody) {
    if *request.method() != Method::POST && *request.method() != Method::PUT {
        return (request, LoggedBody::empty());
    }

    let (parts, mut body) = request.into_parts();
    let hinted = HttpBody::size_hint(&body).lower();
    if hinted > u64::try_from(limit).unwrap_or(u64::MAX) {
        let (body, logged) = counted(body, usize::try_from(hinted).unwrap_or(usize::MAX));
        return (Request::from_parts(parts, body), logged);
    }

    let mut buffered = BytesMut::new();
    loop {
        let next = body.frame().await;
        match next {
            None => break,
            Some(Ok(frame)) => {
                // Trailers are not forwarded on the buffered path.
                if let Ok(data) = frame.into_data() {
                    buffered.extend_from_slice(&data);
                    if buffered.len() > limit {
                        let prefix = buffered.freeze();
                        let floor = prefix.len();
                        let (body, logged) =
                            counted(resume(prefix, body.into_data_stream()), floor);
                        return (Request::from_parts(parts, body), logged);
                    }
                }
            }
            Some(Err(err)) => {
                let prefix = buffered.freeze();
                let floor = prefix.len();
                let (body, logged) = counted(resume(prefix, stream::iter([Err(err)])), floor);
                return (Request::from_parts(parts, body), logged);
            }
        }
    }

    let bytes = buffered.freeze();
    let masked = mask_json_bytes(&bytes);
    (
        Request::from_parts(parts, Body::from(bytes)),
        LoggedBody::Masked(masked),
    )
}

/// A body yielding `prefix` and then everything `rest` yields.
fn resume<S>(prefix: Bytes, rest: S) -> Body
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Send + 'static,
{
    Body::from_stream(stream::once(future::ready(Ok(prefix))).chain(rest))
}

/// Count the bytes of `body` as the handler reads them, starting from `floor`.
fn counted(body: Body, floor: usize) -> (Body, LoggedBody) {
    let seen = Arc::new(AtomicUsize::new(floor));
    let sink = seen.clone();
    let body = ObservedBody::new(body, 0, move |captured| {
        sink.fetch_max(captured.total_len, Ordering::Relaxed);
    });
    (Body::new(body), LoggedBody::Skipped(seen))
}

fn query_map(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            map.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    map
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

fn loggable_response_body(captured: &CapturedBody) -> String {
    if captured.is_truncated() {
        // A truncated prefix cannot be parsed, so it cannot be masked either.
        not_logged(captured.total_len)
    } else {
        String::from_utf8_lossy(&mask_json_bytes(&captured.bytes)).into_owned()
    }
}

fn not_logged(len: usize) -> String {
    format!("[{len} bytes, not logged]")
}

fn to_json(map: &BTreeMap<String, Vec<String>>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn micros(latency: Duration) -> u64 {
    u64::try_from(latency.as_micros()).unwrap_or(u64::MAX)
}
