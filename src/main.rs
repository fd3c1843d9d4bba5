use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use rategate::config::GateConfig;
use rategate::gate::RateGate;
use rategate::http::HttpServer;
use rategate::store::MemoryStore;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "rategate")]
#[command(about = "Fixed-window request rate limiting gate")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Rategate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let config = match args.config {
        Some(path) => GateConfig::from_file(&path)?,
        None => GateConfig::default(),
    };
    info!(
        listen_addr = %config.server.listen_addr,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        protected_routes = config.rate_limit.protected_routes.len(),
        "Configuration loaded"
    );

    // Initialize the counter store and the gate
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(
        RateGate::builder()
            .store(store)
            .max_requests(config.rate_limit.max_requests)
            .window(Duration::from_secs(config.rate_limit.window_secs))
            .key_prefix(config.rate_limit.key_prefix.clone())
            .protected_routes(config.rate_limit.protected_routes.clone())
            .build()?,
    );
    info!("Rate limiting gate initialized");

    // Create and start the HTTP server
    let server = HttpServer::new(config.server.listen_addr, gate);

    info!("Starting HTTP server on {}", config.server.listen_addr);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Rategate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
