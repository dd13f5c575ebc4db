// ============================================
// File: crates/shadowchat-transport/src/memory.rs
// ============================================
//! # In-Memory Transport
//!
//! ## Creation Reason
//! Connects two endpoints inside one process so session logic can be
//! exercised without sockets.
//!
//! ## Main Functionality
//! - `MemoryTransport::pair()`: Two connected endpoints
//! - Closing one end ends the peer's `recv` after queued frames drain
//!
//! ## ⚠️ Important Note for Next Developer
//! - The channels are unbounded; backpressure is the caller's concern
//! - Not intended for production use
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory transport

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::FrameTransport;

// ============================================
// MemoryTransport
// ============================================

/// One end of an in-process frame pipe.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use shadowchat_transport::{FrameTransport, MemoryTransport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (a, b) = MemoryTransport::pair();
/// a.send(Bytes::from_static(b"ping")).await.unwrap();
/// assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"ping"));
/// # }
/// ```
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl MemoryTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Bytes>, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn recv(&self) -> Result<Bytes> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Err(TransportError::Closed);
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            frame = rx.recv() => frame.ok_or(TransportError::Closed),
            _ = closed_rx.changed() => Err(TransportError::Closed),
        }
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        trace!(len = frame.len(), "Memory transport send");
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tx.lock().take();
        self.closed_tx.send_replace(true);
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (a, b) = MemoryTransport::pair();

        for i in 0..5u8 {
            a.send(Bytes::from(vec![i])).await.unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(b.recv().await.unwrap(), Bytes::from(vec![i]));
        }
    }

    #[tokio::test]
    async fn test_close_ends_peer_recv() {
        let (a, b) = MemoryTransport::pair();
        a.send(Bytes::from_static(b"last")).await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(b.recv().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_close_unblocks_own_recv() {
        let (a, _b) = MemoryTransport::pair();
        let a = Arc::new(a);

        let reader = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("recv should unblock")
            .unwrap();
        assert!(result.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (a, _b) = MemoryTransport::pair();
        assert!(a.is_active());
        a.close().await.unwrap();
        a.close().await.unwrap();
        assert!(!a.is_active());
        assert!(a.send(Bytes::from_static(b"x")).await.unwrap_err().is_closed());
        assert!(a.peer_addr().is_none());
    }
}
