//! HTTP stats listener
//!
//! Accept loop, SIGHUP-driven config reloads and graceful shutdown.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Renderer, SystemProbe};
use crate::metrics::Registry;
use crate::pool::BufferPool;
use crate::snapshot::{ConfigHolder, LoadOutcome};

use super::acceptor::ConnectionHandler;

/// Stats HTTP server
pub struct Server {
    /// Bound listener
    listener: TcpListener,
    /// Server configuration
    config: Arc<Config>,
    /// Stats directive file and its published snapshot
    holder: Arc<ConfigHolder>,
    /// Records served in the `ats` section
    registry: Arc<Registry>,
    /// Per-connection state template
    handler: ConnectionHandler,
    /// Shutdown signal
    shutdown_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Create a new server instance
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Arc<Config>, holder: Arc<ConfigHolder>, registry: Arc<Registry>) -> Result<Self> {
        // Initialize buffer pool
        let buffer_pool = BufferPool::new(config.pool.buffer_count, config.pool.buffer_size);
        info!(
            buffers = config.pool.buffer_count,
            buffer_size = config.pool.buffer_size,
            "Buffer pool initialized"
        );

        let probe = SystemProbe::new(&config.system.sys_class_net, &config.system.proc_dir);
        let renderer = Renderer::new(
            registry.clone(),
            probe,
            holder.counters().clone(),
            crate::VERSION,
        );

        let handler = ConnectionHandler::new(
            holder.store().clone(),
            Arc::new(renderer),
            buffer_pool,
            config.server.max_request_bytes,
            config.server.header_timeout(),
        );

        let socket = crate::util::create_tcp_listener(config.server.bind_addr)?;
        let listener = TcpListener::from_std(socket).context("Failed to register listener")?;

        registry.publish_config(&holder.store().load());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            holder,
            registry,
            handler,
            shutdown_rx,
            shutdown_tx,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server (main accept loop)
    pub async fn run(&self) -> Result<()> {
        info!(
            bind_addr = %self.config.server.bind_addr,
            config = ?self.holder.path(),
            grace_period_ms = self.holder.store().grace_period().as_millis() as u64,
            "Server accepting connections"
        );

        #[cfg(unix)]
        let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("Failed to install SIGHUP handler")?;

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            #[cfg(unix)]
            let reload_signal = hangup.recv();
            #[cfg(not(unix))]
            let reload_signal = std::future::pending::<Option<()>>();

            tokio::select! {
                // Accept new connections
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handler.handle(stream, peer).await {
                                    debug!(error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                        }
                    }
                }
                // Config reload request
                _ = reload_signal => {
                    info!("Reload signal received");
                    if let Err(e) = self.reload().await {
                        error!(error = %e, "Config reload failed");
                    }
                }
                // Shutdown signal
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Re-read the stats directive file off the request path
    ///
    /// A failed load leaves the active snapshot in place.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        let holder = self.holder.clone();
        let outcome = tokio::task::spawn_blocking(move || holder.reload())
            .await
            .context("Reload task panicked")??;

        if outcome == LoadOutcome::Reloaded {
            self.registry.publish_config(&self.holder.store().load());
        }
        Ok(outcome)
    }

    /// Stats directive file holder
    pub fn holder(&self) -> &Arc<ConfigHolder> {
        &self.holder
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        // Signal shutdown
        let _ = self.shutdown_tx.send(true);

        info!("Server shutdown complete");
    }
}
