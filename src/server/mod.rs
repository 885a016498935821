//! HTTP surface: router, admission middleware and graceful shutdown.

pub mod errors;
pub mod middleware;
pub mod routes;
pub mod state;


use std::future::{Future, IntoFuture};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use routes::create_router;
pub use state::AppState;

/// Serve `router` on `listener` until `signal` resolves.
///
/// After the signal the listener stops accepting and in-flight requests get up
/// to `grace` to finish. When the grace period runs out `shutdown` is cancelled,
/// which aborts every batch still running, and the server task is dropped.
pub async fn serve<F>(
    router: Router,
    listener: TcpListener,
    grace: Duration,
    shutdown: CancellationToken,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let draining = CancellationToken::new();
    let drain_signal = draining.clone();

    let mut server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { drain_signal.cancelled().await })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            tracing::warn!("Server exited before a shutdown signal");
            return Ok(joined??);
        }
        _ = signal => {}
    }

    tracing::info!(grace_secs = grace.as_secs_f64(), "stopping server");
    draining.cancel();

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!("Grace period elapsed, cancelling in-flight requests");
            shutdown.cancel();
            server.abort();
        }
    }

    tracing::info!("server stopped");
    Ok(())
}
