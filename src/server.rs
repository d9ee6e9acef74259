//! Serving loop with bounded graceful shutdown.

use crate::state::AppState;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve `app` until `shutdown` resolves, then drain.
///
/// On the shutdown trigger the state is released immediately (readiness
/// drops, pooled fetch clients are freed) and in-flight requests get at
/// most `drain_timeout` to finish before the remaining connections are
/// dropped.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            state.shutdown();
            return Ok(joined??);
        }
        _ = shutdown => {}
    }

    state.shutdown();
    let _ = stop_tx.send(());
    tracing::info!(timeout_secs = drain_timeout.as_secs(), "Draining connections...");

    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Drain timeout elapsed, dropping remaining connections"
            );
            server.abort();
        }
    }

    Ok(())
}
