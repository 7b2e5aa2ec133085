//! astats server - Entry Point
//!
//! Serves registry statistics as JSON with hot-reloadable access control.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use astats_server::metrics::{init_metrics, Registry, RELOAD_COUNTERS};
use astats_server::snapshot::ConfigHolder;
use astats_server::{Config, Server, VERSION};

/// Application entry point
fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("astats-server.toml"));

    // Load configuration
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.effective_workers())
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config, config_path))
}

async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    // Initialize tracing/logging
    astats_server::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting astats server"
    );

    RELOAD_COUNTERS.mark_started();

    // Route the server's own metrics into the registry it serves
    let registry = Arc::new(Registry::new());
    init_metrics(registry.clone())?;

    let stats_path = config.stats.resolved_path();
    let holder = if config.stats.require_config_file {
        ConfigHolder::open(&stats_path, config.stats.grace_period(), RELOAD_COUNTERS.clone())
    } else {
        ConfigHolder::open_or_default(&stats_path, config.stats.grace_period(), RELOAD_COUNTERS.clone())
    }
    .with_context(|| format!("Failed to load stats config from {:?}", stats_path))?;

    // Create and start the server
    let config = Arc::new(config);
    let server = Server::new(config.clone(), Arc::new(holder), registry)?;

    info!(
        bind_addr = %server.local_addr()?,
        workers = config.server.effective_workers(),
        "Server listening"
    );

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            server.shutdown().await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
