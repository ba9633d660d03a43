use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::handler::{admit, GateState};
use crate::error::{GateError, Result};

/// Guard to decrement active connections counter when dropped
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Bind `config.listen` and serve until `shutdown` is cancelled.
pub async fn run(state: Arc<GateState>, shutdown: CancellationToken) -> Result<()> {
    let addr = state.config.listen;
    let listener = TcpListener::bind(addr).await.map_err(GateError::Io)?;
    info!(?addr, "starting admission gate");
    serve(listener, state, shutdown).await
}

/// Serve admission checks on an already bound listener.
///
/// After `shutdown` fires no new connections are accepted, queued callers
/// are rejected, and in-flight connections get up to
/// `timeout.shutdown_secs` to finish.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GateState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let builder = ConnBuilder::new(TokioExecutor::new());
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                active_connections.fetch_add(1, Ordering::Relaxed);

                let builder = builder.clone();
                let state = state.clone();
                let active_connections = active_connections.clone();

                tokio::spawn(async move {
                    let _guard = ConnectionGuard(active_connections);
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move {
                            let resp = admit(&state, req.method(), req.uri(), req.headers(), peer).await;
                            Ok::<_, hyper::Error>(resp)
                        }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    // Queued callers would otherwise hold their connections open until
    // their window deadline.
    state.manager.shutdown().await;

    let shutdown_timeout = Duration::from_secs(state.config.timeout.shutdown_secs);
    info!(
        "Waiting for active connections to finish (timeout: {}s)",
        state.config.timeout.shutdown_secs
    );
    let start = std::time::Instant::now();

    loop {
        let active = active_connections.load(Ordering::Relaxed);
        if active == 0 {
            info!("All connections closed, shutdown complete");
            break;
        }

        if start.elapsed() >= shutdown_timeout {
            warn!(
                active_connections = active,
                "Shutdown timeout reached, {} connections still active", active
            );
            break;
        }

        sleep(Duration::from_millis(100)).await;
    }

    info!("Admission gate stopped");
    Ok(())
}

/// Resolve on SIGTERM or SIGINT.
pub async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
    Ok(())
}
