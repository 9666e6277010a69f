//! Graceful shutdown.

use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that signal source is ignored and the
/// other one still works.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Serve `app` until `signal` completes, then give in-flight requests up
/// to `grace` before returning.
///
/// # Errors
///
/// Returns the server's I/O error, or a join error if the server task
/// panicked.
pub async fn serve_with_grace<F>(
    listener: TcpListener,
    app: axum::Router,
    signal: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.await;
        let _ = stopping_tx.send(());
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server => return Ok(result??),
        _ = stopping_rx => {}
    }

    tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => Ok(result??),
        Err(_) => {
            tracing::warn!("Grace period elapsed, dropping remaining connections");
            server.abort();
            Ok(())
        }
    }
}
