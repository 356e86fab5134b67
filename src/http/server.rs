//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the terminal handlers
//! - Wrap it in the observability pipeline
//! - Serve on a bound listener until shutdown, then drain

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::middleware::apply_pipeline;
use crate::observability::Metrics;
use crate::version::BuildInfo;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Metrics,
    pub build: BuildInfo,
}

/// HTTP server for the Erebus API.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig, build: BuildInfo, metrics: Metrics) -> Self {
        let state = AppState {
            metrics: metrics.clone(),
            build,
        };
        let router = apply_pipeline(Self::routes(state), metrics, &config);
        Self { router, config }
    }

    fn routes(state: AppState) -> Router {
        Router::new()
            .route("/api/healthz", get(handlers::healthz))
            .route("/api/version", get(handlers::version))
            .route("/metrics", get(handlers::metrics))
            .with_state(state)
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests
    /// for at most `server.shutdown_grace_secs`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        tracing::info!(address = %addr, "HTTP server starting");

        let draining = Arc::new(Notify::new());
        let signal = {
            let draining = draining.clone();
            async move {
                // A dropped coordinator counts as a shutdown request.
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
                draining.notify_one();
            }
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .into_future();

        tokio::select! {
            result = server => result?,
            _ = async {
                draining.notified().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace_secs = grace.as_secs(), "Drain deadline reached, forcing shutdown");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
