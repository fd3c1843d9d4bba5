//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use tracing::{error, info};

use super::middleware::enforce_rate_limit;
use crate::error::{GateError, Result};
use crate::gate::RateGate;

/// HTTP server fronting the rate limiting gate.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The gate instance
    gate: Arc<RateGate>,
}

impl HttpServer {
    /// Create a new HTTP server with the given gate.
    pub fn new(addr: SocketAddr, gate: Arc<RateGate>) -> Self {
        Self { addr, gate }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = router(self.gate);

        info!(
            addr = %self.addr,
            "Starting HTTP server for rate limiting gate"
        );

        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GateError::Io(e)
        })
    }
}

/// Build the service router: every request passes through the gate before
/// reaching the origin handler.
fn router(gate: Arc<RateGate>) -> Router {
    Router::new()
        .fallback(origin)
        .layer(middleware::from_fn_with_state(gate, enforce_rate_limit))
}

/// Placeholder origin handler standing in for the application behind the
/// gate. Answers every allowed request with 200 "ok".
async fn origin() -> &'static str {
    "ok"
}
