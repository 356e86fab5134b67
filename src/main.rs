//! Erebus backend daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ RequestIdLayer ─▶ fault isolation ─▶ access log ─▶ metrics ─▶ timeout ─▶ handler
//!                                                                                          │
//!     Client Response                                                                      │
//!     ◀───────────── (x-request-id) ◀─ (500 on panic) ◀─ (masked record) ◀─ (counters) ◀──┘
//!
//!     Routes: GET /api/healthz, GET /api/version, GET /metrics
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use erebus::config::{load_config, load_from_env};
use erebus::lifecycle::{wait_for_signal, Shutdown};
use erebus::observability::logging::init_logging;
use erebus::{BuildInfo, HttpServer, Metrics};

#[derive(Parser)]
#[command(name = "erebusd")]
#[command(about = "Erebus backend service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (e.g. 127.0.0.1:8080).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_logging(&config.logging)?;

    let build = BuildInfo::with_overrides(&config.build);
    tracing::info!(
        version = %build.version,
        commit = %build.commit,
        environment = %config.environment,
        "erebusd starting"
    );

    let metrics = Metrics::new()?;
    metrics.set_build_info(&build);

    tracing::info!(
        bind_address = %config.server.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        log_format = ?config.logging.format,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    HttpServer::new(config, build, metrics)
        .run(listener, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
