// ============================================
// File: crates/shadowchat-node/src/services/connection.rs
// ============================================
//! # Connection
//!
//! ## Creation Reason
//! Represents one peer: its transport handle, a bounded outbound queue
//! and the user bound to it once identified.
//!
//! ## Main Functionality
//! - `Connection`: Transport slot, outbound FIFO, close signal
//! - `User`: Identity bound to a connection
//!
//! ## Connection Lifecycle
//! ```text
//!  new()              attach_transport()           close()
//!    │                        │                       │
//!    ▼                        ▼                       ▼
//! ┌────────┐  upgrade   ┌──────────┐  error/close ┌────────┐
//! │ no     │ ─────────► │ attached │ ───────────► │ closed │
//! │ transp.│            │          │              │        │
//! └────────┘            └──────────┘              └────────┘
//!      send() enqueues in every state until closed
//! ```
//!
//! ## Backpressure
//! `send` awaits a free slot when the queue is full, with no timeout.
//! A slow reader therefore stalls whoever is broadcasting to it until
//! the outbound pump drains a frame or the connection closes.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The outbound receiver can be taken exactly once, by the pump
//! - `close()` wakes every task waiting in `closed()`, `flush()`, `send()` or `receive()`
//! - Whoever drains the queue must call `frame_written()` once per frame
//!
//! ## Last Modified
//! v0.1.0 - Initial connection implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, trace};

use shadowchat_common::{ConnectionId, UserId};
use shadowchat_core::KeyExchange;
use shadowchat_transport::{FrameTransport, TransportError};

use crate::error::{NodeError, Result};

/// Default outbound queue capacity in frames.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

// ============================================
// User
// ============================================

/// Identity bound to a connection after the username handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Stable identifier used for key lookups.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// SPKI DER public key, when announced at connect time.
    pub public_key: Option<Vec<u8>>,
}

impl User {
    /// Creates a user.
    pub fn new(id: UserId, username: impl Into<String>, public_key: Option<Vec<u8>>) -> Self {
        Self {
            id,
            username: username.into(),
            public_key,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field(
                "public_key",
                &self.public_key.as_deref().map(KeyExchange::fingerprint),
            )
            .finish()
    }
}

// ============================================
// Connection
// ============================================

/// One peer's transport plus buffering.
///
/// # Thread Safety
/// Shared as `Arc<Connection>` between the session pumps and the relay.
pub struct Connection {
    id: ConnectionId,
    transport: RwLock<Option<Arc<dyn FrameTransport>>>,
    outbound_tx: mpsc::Sender<Bytes>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    capacity: usize,
    pending: AtomicUsize,
    drained: Notify,
    user: OnceLock<User>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    created_at: Instant,
}

impl Connection {
    /// Creates a connection with no transport yet.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (closed_tx, _) = watch::channel(false);
        Self {
            id: ConnectionId::generate(),
            transport: RwLock::new(None),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            capacity,
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
            user: OnceLock::new(),
            closed: AtomicBool::new(false),
            closed_tx,
            created_at: Instant::now(),
        }
    }

    /// Creates a connection with the transport already attached.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn FrameTransport>, capacity: usize) -> Self {
        let connection = Self::new(capacity);
        *connection.transport.write() = Some(transport);
        connection
    }

    // ========================================
    // Accessors
    // ========================================

    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the identified user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.get()
    }

    /// Returns the identified user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.get().map(|u| &u.id)
    }

    /// Returns the remote address of the attached transport.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.read().as_ref().and_then(|t| t.peer_addr())
    }

    /// Returns the outbound queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of frames waiting in the outbound queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.capacity - self.outbound_tx.capacity()
    }

    /// Returns `true` once `close()` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns how long ago the connection was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    // ========================================
    // Setup
    // ========================================

    /// Attaches the transport after the upgrade completes.
    ///
    /// # Errors
    /// - `AlreadyAttached` if a transport is present
    /// - `Closed` if the connection was closed meanwhile
    pub fn attach_transport(&self, transport: Arc<dyn FrameTransport>) -> Result<()> {
        if self.is_closed() {
            return Err(NodeError::closed());
        }
        let mut slot = self.transport.write();
        if slot.is_some() {
            return Err(NodeError::AlreadyAttached(self.id));
        }
        *slot = Some(transport);
        drop(slot);

        trace!(connection_id = %self.id, "Transport attached");
        Ok(())
    }

    /// Binds the user. Users are immutable once set.
    ///
    /// # Errors
    /// Returns `UserAlreadySet` on a second call.
    pub fn set_user(&self, user: User) -> Result<()> {
        self.user
            .set(user)
            .map_err(|_| NodeError::UserAlreadySet(self.id))
    }

    /// Hands the outbound queue to the pump that drains it.
    ///
    /// Returns `None` after the first call or once closed.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.outbound_rx.lock().take()
    }

    // ========================================
    // I/O
    // ========================================

    /// Enqueues a frame for the peer, waiting while the queue is full.
    ///
    /// # Errors
    /// Returns a closed-transport error once the connection is closed.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(NodeError::closed());
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.outbound_tx.send(frame).await.is_err() {
            self.frame_written();
            return Err(NodeError::closed());
        }
        Ok(())
    }

    /// Marks one dequeued frame as handed to the transport.
    pub fn frame_written(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Resolves once every enqueued frame has been written, or the
    /// connection closes.
    pub async fn flush(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 || self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Reads the next frame from the transport.
    ///
    /// # Errors
    /// Returns a transport error when the transport closes or resets.
    pub async fn receive(&self) -> Result<Bytes> {
        let transport = self.transport()?;
        Ok(transport.recv().await?)
    }

    /// Writes one frame straight to the transport, bypassing the queue.
    ///
    /// # Errors
    /// Returns a transport error if the write fails.
    pub async fn write(&self, frame: Bytes) -> Result<()> {
        let transport = self.transport()?;
        Ok(transport.send(frame).await?)
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Closes the transport and releases it. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns the transport's error if the close frame could not be
    /// sent. The connection is closed regardless.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.closed_tx.send_replace(true);
        self.drained.notify_waiters();
        self.outbound_rx.lock().take();

        let transport = self.transport.write().take();
        debug!(connection_id = %self.id, age_ms = self.age().as_millis(), "Closing connection");

        match transport {
            Some(transport) if transport.is_active() => Ok(transport.close().await?),
            _ => Ok(()),
        }
    }

    fn transport(&self) -> Result<Arc<dyn FrameTransport>> {
        if self.is_closed() {
            return Err(NodeError::closed());
        }
        self.transport
            .read()
            .clone()
            .ok_or(NodeError::Transport(TransportError::NotConnected))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user", &self.user_id())
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use shadowchat_transport::MemoryTransport;

    fn attached(capacity: usize) -> (Arc<Connection>, MemoryTransport) {
        let (local, remote) = MemoryTransport::pair();
        let conn = Arc::new(Connection::with_transport(Arc::new(local), capacity));
        (conn, remote)
    }

    #[tokio::test]
    async fn test_send_is_fifo() {
        let (conn, _remote) = attached(8);
        let mut queue = conn.take_outbound().unwrap();

        for i in 0..5u8 {
            conn.send(Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(conn.queued(), 5);
        for i in 0..5u8 {
            assert_eq!(queue.recv().await.unwrap(), Bytes::from(vec![i]));
        }
        assert!(conn.take_outbound().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_drained() {
        let (conn, _remote) = attached(2);
        let mut queue = conn.take_outbound().unwrap();

        conn.send(Bytes::from_static(b"1")).await.unwrap();
        conn.send(Bytes::from_static(b"2")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            conn.send(Bytes::from_static(b"3")),
        )
        .await;
        assert!(blocked.is_err(), "send on a full queue should wait");

        let sender = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.send(Bytes::from_static(b"3")).await })
        };
        assert_eq!(queue.recv().await.unwrap(), Bytes::from_static(b"1"));
        sender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_blocked_sender() {
        let (conn, _remote) = attached(1);
        conn.send(Bytes::from_static(b"fill")).await.unwrap();

        let sender = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.send(Bytes::from_static(b"late")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), sender)
            .await
            .expect("blocked sender should be released")
            .unwrap();
        assert!(result.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_receive_and_write() {
        let (conn, remote) = attached(4);

        remote.send(Bytes::from_static(b"inbound")).await.unwrap();
        assert_eq!(conn.receive().await.unwrap(), Bytes::from_static(b"inbound"));

        conn.write(Bytes::from_static(b"outbound")).await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), Bytes::from_static(b"outbound"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, remote) = attached(4);
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert!(conn.is_closed());
        assert!(conn.send(Bytes::from_static(b"x")).await.unwrap_err().is_closed());
        assert!(conn.receive().await.unwrap_err().is_closed());
        assert!(remote.recv().await.unwrap_err().is_closed());
        tokio::time::timeout(Duration::from_millis(100), conn.closed())
            .await
            .expect("closed() resolves after close");
    }

    #[tokio::test]
    async fn test_attach_once() {
        let conn = Connection::new(4);
        assert!(matches!(
            conn.receive().await,
            Err(NodeError::Transport(TransportError::NotConnected))
        ));

        let (a, b) = MemoryTransport::pair();
        conn.attach_transport(Arc::new(a)).unwrap();
        assert!(matches!(
            conn.attach_transport(Arc::new(b)),
            Err(NodeError::AlreadyAttached(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_waits_for_written_frames() {
        let (conn, _remote) = attached(4);
        let mut queue = conn.take_outbound().unwrap();
        conn.send(Bytes::from_static(b"a")).await.unwrap();
        conn.send(Bytes::from_static(b"b")).await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), conn.flush()).await;
        assert!(pending.is_err(), "flush should wait for queued frames");

        let flusher = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.flush().await })
        };
        queue.recv().await.unwrap();
        conn.frame_written();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!flusher.is_finished(), "one frame still pending");

        queue.recv().await.unwrap();
        conn.frame_written();
        tokio::time::timeout(Duration::from_secs(1), flusher)
            .await
            .expect("flush resolves once drained")
            .unwrap();
        tokio::time::timeout(Duration::from_millis(100), conn.flush())
            .await
            .expect("empty queue flushes immediately");
    }

    #[tokio::test]
    async fn test_close_releases_flush() {
        let (conn, _remote) = attached(4);
        conn.send(Bytes::from_static(b"stuck")).await.unwrap();

        let flusher = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.flush().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), flusher)
            .await
            .expect("close wakes flush")
            .unwrap();
    }

    #[test]
    fn test_user_is_immutable() {
        let conn = Connection::new(4);
        let alice = User::new(UserId::new("alice").unwrap(), "alice", None);
        conn.set_user(alice.clone()).unwrap();
        assert_eq!(conn.user(), Some(&alice));

        let other = User::new(UserId::new("mallory").unwrap(), "mallory", None);
        assert!(matches!(conn.set_user(other), Err(NodeError::UserAlreadySet(_))));
        assert_eq!(conn.user_id().unwrap().as_str(), "alice");
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let conn = Connection::new(0);
        assert_eq!(conn.capacity(), 1);
        assert_eq!(conn.queued(), 0);
    }
}
