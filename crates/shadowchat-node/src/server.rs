// ============================================
// File: crates/shadowchat-node/src/server.rs
// ============================================
//! # Relay Server
//!
//! ## Creation Reason
//! Owns the WebSocket listener and the relay, and turns every accepted
//! socket into a running session.
//!
//! ## Main Functionality
//! - `Server`: Lifecycle management (bind, serve, shutdown)
//! - Accept loop with per-connection tasks
//! - Graceful shutdown that closes every live connection
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Server                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  accept   ┌───────────────────────────┐  │
//! │  │  WsListener  │──────────►│  per-connection task      │  │
//! │  │  (path /ws)  │           │   upgrade                 │  │
//! │  └──────────────┘           │   register in Relay       │  │
//! │                             │   SessionHandler + Server │  │
//! │                             │   Role run to completion  │  │
//! │                             └─────────────┬─────────────┘  │
//! │                                           ▼                │
//! │                             ┌───────────────────────────┐  │
//! │                             │          Relay            │  │
//! │                             └───────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Connections over the limit are upgraded and then closed at once
//! - A failed upgrade only affects that socket, never the accept loop
//! - Use tokio::select! for concurrent operations
//!
//! ## Last Modified
//! v0.1.0 - Initial relay server

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shadowchat_core::EnvelopeCodec;
use shadowchat_transport::{FrameTransport, WsListener};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::handlers::ServerRole;
use crate::services::{Connection, Relay, SessionHandler};

/// How long shutdown waits for sessions to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================
// Server
// ============================================

/// ShadowChat relay server.
///
/// # Lifecycle
/// 1. Create with `Server::new(config)`
/// 2. Start with `server.run().await`, or `bind` then `serve`
/// 3. Shutdown via `shutdown()` or Ctrl+C
pub struct Server {
    /// Server configuration.
    config: NodeConfig,
    /// Live connections.
    relay: Arc<Relay>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Creates a new server instance.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let relay = Arc::new(Relay::new(config.limits.max_connections));
        Self {
            config,
            relay,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Returns the relay.
    #[must_use]
    pub const fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Binds the configured listen address.
    ///
    /// # Errors
    /// Returns `StartupFailed` if the address cannot be bound.
    pub async fn bind(&self) -> Result<WsListener> {
        let network = &self.config.network;
        WsListener::bind(network.listen_addr, network.path.clone())
            .await
            .map_err(|e| NodeError::startup_failed(format!("bind {} failed: {e}", network.listen_addr)))
    }

    /// Runs the server until Ctrl+C or [`Server::shutdown`].
    ///
    /// # Errors
    /// Returns error if the server fails to start.
    pub async fn run(&self) -> Result<()> {
        info!("Starting ShadowChat relay v{}", env!("CARGO_PKG_VERSION"));

        let listener = self.bind().await?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let signal = async {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Received shutdown signal"),
                        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
                    }
                    self.shutdown();
                }
                _ = shutdown_rx.recv() => {}
            }
        };
        tokio::join!(self.serve(listener), signal);

        info!("Server shutdown complete");
        Ok(())
    }

    /// Accepts connections on `listener` until shutdown.
    pub async fn serve(&self, listener: WsListener) {
        info!(
            addr = %listener.local_addr(),
            path = %listener.path(),
            max_connections = self.relay.max_connections(),
            "Relay listening"
        );

        let listener = Arc::new(listener);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sessions = JoinSet::new();

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Accept loop received shutdown signal");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let listener = Arc::clone(&listener);
                            let relay = Arc::clone(&self.relay);
                            let config = self.config.clone();
                            sessions.spawn(async move {
                                let transport = match listener.upgrade(stream, peer).await {
                                    Ok(t) => Arc::new(t),
                                    Err(e) => {
                                        debug!(peer = %peer, "WebSocket upgrade failed: {}", e);
                                        return;
                                    }
                                };
                                handle_connection(transport, relay, &config).await;
                            });
                        }
                        Err(e) => {
                            if !self.shutdown.load(Ordering::SeqCst) {
                                warn!("Accept error: {}", e);
                            }
                        }
                    }
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Session task failed: {}", e);
                    }
                }
            }
        }

        info!(live = self.relay.len(), "Closing live connections");
        self.relay.close_all().await;

        let drain = async { while sessions.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Sessions did not finish in time; aborting");
            sessions.abort_all();
        }
    }

    /// Triggers server shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}

/// Registers one upgraded transport and runs its session.
async fn handle_connection(transport: Arc<dyn FrameTransport>, relay: Arc<Relay>, config: &NodeConfig) {
    let peer = transport.peer_addr();
    let connection = Arc::new(Connection::with_transport(
        Arc::clone(&transport),
        config.limits.outbound_queue_capacity,
    ));

    if let Err(e) = relay.register(&connection) {
        warn!(connection_id = %connection.id(), "Rejecting connection: {}", e);
        if let Err(e) = connection.close().await {
            debug!(connection_id = %connection.id(), error = %e, "Error closing rejected connection");
        }
        return;
    }

    info!(
        connection_id = %connection.id(),
        peer = ?peer,
        live = relay.len(),
        "Connection accepted"
    );

    let handler = SessionHandler::new(Arc::clone(&connection), ServerRole::new(Arc::clone(&relay)))
        .with_codec(EnvelopeCodec::with_max_frame_size(config.limits.max_frame_size))
        .with_idle_timeout(config.limits.idle_timeout());
    let last = handler.run().await;
    debug!(connection_id = %connection.id(), state = %last, "Session task finished");
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("path", &self.config.network.path)
            .field("live", &self.relay.len())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
