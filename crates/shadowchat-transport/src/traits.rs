// ============================================
// File: crates/shadowchat-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the abstract interface for moving whole frames between a chat
//! node and its peer, allowing WebSocket and in-memory implementations.
//!
//! ## Main Functionality
//! - `FrameTransport`: Frame-oriented, full-duplex transport
//!
//! ## Design
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               SessionHandler                 │
//! │   inbound pump              outbound pump    │
//! │        │                          ▲          │
//! │        ▼                          │          │
//! │   ┌──────────────────────────────────────┐   │
//! │   │        dyn FrameTransport            │   │
//! │   │  recv() ◄──── peer       send() ────►│   │
//! │   └──────────────────────────────────────┘   │
//! │          │                       │           │
//! │    WsTransport<S>         MemoryTransport    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `recv` and `send` may run concurrently from two tasks
//! - `close` must unblock a pending `recv` on the same side
//! - Frames are opaque bytes; decoding belongs to the protocol layer
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ============================================
// FrameTransport
// ============================================

/// Frame-oriented full-duplex transport.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` and must allow one task to be
/// blocked in [`recv`](FrameTransport::recv) while another calls
/// [`send`](FrameTransport::send) or [`close`](FrameTransport::close).
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Receives the next frame.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` once either side has closed.
    async fn recv(&self) -> Result<Bytes>;

    /// Sends one frame.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` if the transport is closed.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Closes the transport. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns an error if the close frame could not be written. The
    /// transport is considered closed regardless.
    async fn close(&self) -> Result<()>;

    /// Returns `true` until the transport is closed.
    fn is_active(&self) -> bool;

    /// Returns the remote address, if the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr>;
}
