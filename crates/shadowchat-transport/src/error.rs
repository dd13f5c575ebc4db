// ============================================
// File: crates/shadowchat-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the frame transports: socket binding, the
//! WebSocket upgrade, and frame I/O.
//!
//! ## Error Categories
//! 1. **Lifecycle**: The transport closed, normally or not
//! 2. **Network Errors**: Bind and socket I/O failures
//! 3. **Handshake Errors**: Failed WebSocket upgrade or wrong endpoint
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Closed` is the normal end of a session, log it at debug level
//! - Nothing in this crate retries; callers decide with `is_retryable`
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use shadowchat_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Lifecycle
    // ========================================

    /// The transport was closed by either side.
    #[error("Transport closed")]
    Closed,

    /// No transport is attached yet.
    #[error("Transport not connected")]
    NotConnected,

    // ========================================
    // Network Errors
    // ========================================

    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    // ========================================
    // Handshake Errors
    // ========================================

    /// WebSocket upgrade or dial failed.
    #[error("WebSocket handshake failed: {reason}")]
    Handshake {
        /// Why the handshake failed
        reason: String,
    },

    /// WebSocket protocol error on an established connection.
    #[error("WebSocket error: {reason}")]
    WebSocket {
        /// Error reported by the WebSocket layer
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates a `Handshake` error.
    pub fn handshake(reason: impl ToString) -> Self {
        Self::Handshake {
            reason: reason.to_string(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the transport is gone and the session must end.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed | Self::NotConnected => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns `true` if a fresh attempt may succeed, e.g. dialing a
    /// relay that is still starting up.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        use tungstenite::error::ProtocolError;

        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                Self::Closed
            }
            tungstenite::Error::Io(e) => Self::io("websocket stream", e),
            other => Self::WebSocket {
                reason: other.to_string(),
            },
        }
    }
}

// ============================================
// Tests
// ============================================
