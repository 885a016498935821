//! Multiplexer server binary.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! multiplexer --config config.yaml
//!
//! # With environment variables only
//! MULTIPLEXER_SERVER__PORT=9000 multiplexer
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use multiplexer::server::{self, AppState, create_router};
use multiplexer::telemetry::{LoggingConfig, init_logging};
use multiplexer::{MultiplexerConfig, ReqwestHttpClient};

/// Fetch batches of URLs concurrently over HTTP
#[derive(Parser, Debug)]
#[command(name = "multiplexer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        MultiplexerConfig::load(&config_path)?
    } else {
        MultiplexerConfig::from_env()?
    };

    init_logging(LoggingConfig::from(&config.logging));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_urls = config.limits.max_urls,
        max_parallel_fetches = config.limits.max_parallel_fetches,
        item_timeout_ms = config.limits.item_timeout_ms,
        admission_capacity = config.limits.admission_capacity,
        "initializing server"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shutdown = CancellationToken::new();
    let state = AppState::new(
        Arc::new(ReqwestHttpClient::new()),
        &config.limits,
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server started");

    server::serve(
        create_router(state),
        listener,
        config.server.shutdown_grace(),
        shutdown,
        shutdown_signal(),
    )
    .await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
