//! Erebus backend service library.
//!
//! Health, version and metrics endpoints behind a request observability
//! pipeline: request IDs, panic isolation, masked access logs and Prometheus
//! instrumentation.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod version;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Metrics;
pub use version::BuildInfo;
