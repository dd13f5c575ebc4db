// ============================================
// File: crates/shadowchat-node/src/services/relay.rs
// ============================================
//! # Relay
//!
//! ## Creation Reason
//! Keeps the registry of live connections and fans frames out from one
//! sender to every other registered peer.
//!
//! ## Main Functionality
//! - `Relay`: Registry behind one mutex plus broadcast dispatch
//! - Public key directory for identified users
//!
//! ## Broadcast Flow
//! ```text
//!            broadcast(from = X, frame)
//!                      │
//!      ┌───────────────▼────────────────┐
//!      │ lock registry                  │
//!      │   snapshot peers != X          │  no I/O under the lock
//!      │ unlock                         │
//!      └───────────────┬────────────────┘
//!                      │
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   peer A.send   peer B.send   peer C.send     (may wait on a full queue)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The registry holds `Weak` references; sessions own their connections
//! - Deregistration happens only on the session's exit path
//! - Frames are forwarded byte-for-byte; the relay never decrypts
//!
//! ## Last Modified
//! v0.1.0 - Initial relay implementation

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use shadowchat_common::ConnectionId;
use shadowchat_core::KeyStore;

use crate::error::{NodeError, Result};
use crate::services::connection::Connection;

// ============================================
// Relay
// ============================================

/// Registry of live connections with flat broadcast.
pub struct Relay {
    connections: Mutex<HashMap<ConnectionId, Weak<Connection>>>,
    directory: KeyStore,
    max_connections: usize,
}

impl Relay {
    /// Creates a relay accepting up to `max_connections` peers.
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            directory: KeyStore::new(),
            max_connections,
        }
    }

    /// Adds a connection to the registry.
    ///
    /// # Errors
    /// Returns `ConnectionLimitReached` when the relay is full.
    pub fn register(&self, connection: &Arc<Connection>) -> Result<()> {
        let mut connections = self.connections.lock();
        if connections.len() >= self.max_connections && !connections.contains_key(&connection.id()) {
            return Err(NodeError::ConnectionLimitReached {
                limit: self.max_connections,
            });
        }
        connections.insert(connection.id(), Arc::downgrade(connection));
        let total = connections.len();
        drop(connections);

        info!(connection_id = %connection.id(), total, "Connection registered");
        Ok(())
    }

    /// Removes a connection. Returns `true` if it was registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock();
        let removed = connections.remove(&id).is_some();
        let total = connections.len();
        drop(connections);

        if removed {
            info!(connection_id = %id, total, "Connection deregistered");
        }
        removed
    }

    /// Forwards `frame` unchanged to every registered connection except
    /// `from`. Returns how many peers accepted it.
    ///
    /// Peers that closed meanwhile are skipped silently.
    pub async fn broadcast(&self, from: ConnectionId, frame: Bytes) -> usize {
        let peers: Vec<Arc<Connection>> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|(id, _)| **id != from)
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        let mut delivered = 0;
        for peer in peers {
            match peer.send(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => trace!(connection_id = %peer.id(), error = %e, "Skipping closed peer"),
            }
        }

        debug!(from = %from, delivered, len = frame.len(), "Broadcast complete");
        delivered
    }

    /// Closes every registered connection. Used at shutdown.
    pub async fn close_all(&self) {
        let peers: Vec<Arc<Connection>> = self
            .connections
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        for peer in peers {
            if let Err(e) = peer.close().await {
                debug!(connection_id = %peer.id(), error = %e, "Error closing connection");
            }
        }
    }

    // ========================================
    // Introspection
    // ========================================

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    /// Ids of all registered connections.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().keys().copied().collect()
    }

    /// Public keys of identified users, kept for the session's lifetime.
    #[must_use]
    pub const fn directory(&self) -> &KeyStore {
        &self.directory
    }

    /// Configured connection limit.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("connections", &self.len())
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<Connection>, mpsc::Receiver<Bytes>) {
        let conn = Arc::new(Connection::new(16));
        let queue = conn.take_outbound().unwrap();
        (conn, queue)
    }

    #[test]
    fn test_register_and_deregister() {
        let relay = Relay::new(10);
        let (a, _qa) = connection();
        let (b, _qb) = connection();

        assert!(relay.is_empty());
        relay.register(&a).unwrap();
        relay.register(&b).unwrap();
        assert_eq!(relay.len(), 2);
        assert!(relay.contains(a.id()));

        let mut ids = relay.connection_ids();
        ids.sort_by_key(ToString::to_string);
        let mut expected = vec![a.id(), b.id()];
        expected.sort_by_key(ToString::to_string);
        assert_eq!(ids, expected);

        assert!(relay.deregister(a.id()));
        assert!(!relay.deregister(a.id()));
        assert_eq!(relay.len(), 1);
    }

    #[test]
    fn test_connection_limit() {
        let relay = Relay::new(1);
        let (a, _qa) = connection();
        let (b, _qb) = connection();

        relay.register(&a).unwrap();
        relay.register(&a).unwrap();
        assert!(matches!(
            relay.register(&b),
            Err(NodeError::ConnectionLimitReached { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let relay = Relay::new(10);
        let mut peers = Vec::new();
        for _ in 0..4 {
            let (conn, queue) = connection();
            relay.register(&conn).unwrap();
            peers.push((conn, queue));
        }

        let sender = peers[0].0.id();
        let frame = Bytes::from_static(b"{\"type\":\"textMessage\"}");
        assert_eq!(relay.broadcast(sender, frame.clone()).await, 3);

        for (conn, queue) in &mut peers {
            if conn.id() == sender {
                assert!(queue.try_recv().is_err());
            } else {
                assert_eq!(queue.try_recv().unwrap(), frame);
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_ignores_dropped_and_closed_peers() {
        let relay = Relay::new(10);
        let (sender, _qs) = connection();
        let (alive, mut q_alive) = connection();
        let (closed, _qc) = connection();
        relay.register(&sender).unwrap();
        relay.register(&alive).unwrap();
        relay.register(&closed).unwrap();

        {
            let (dropped, _qd) = connection();
            relay.register(&dropped).unwrap();
        }
        closed.close().await.unwrap();

        let delivered = relay.broadcast(sender.id(), Bytes::from_static(b"x")).await;
        assert_eq!(delivered, 1);
        assert_eq!(q_alive.try_recv().unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_close_all() {
        let relay = Relay::new(10);
        let (a, _qa) = connection();
        let (b, _qb) = connection();
        relay.register(&a).unwrap();
        relay.register(&b).unwrap();

        relay.close_all().await;
        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}
