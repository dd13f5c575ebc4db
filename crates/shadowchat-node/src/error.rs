// ============================================
// File: crates/shadowchat-node/src/error.rs
// ============================================
//! # Node Error Types
//!
//! ## Creation Reason
//! Top-level error type for the relay server and chat client, wrapping
//! the lower-layer errors so callers can classify any failure.
//!
//! ## Error Categories
//! 1. **Configuration**: Loading and validating the TOML file
//! 2. **Connection**: Attaching transports, identity, relay limits
//! 3. **Session**: Missing session keys and other per-frame drops
//! 4. **Lifecycle**: Startup and shutdown
//!
//! ## ⚠️ Important Note for Next Developer
//! - Per-frame errors are logged and dropped by `SessionHandler`; only
//!   errors classified by `is_fatal_to_session` end a session
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use shadowchat_common::error::CommonError;
use shadowchat_common::{ConnectionId, UserId};
use shadowchat_core::error::CoreError;
use shadowchat_transport::error::TransportError;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Node error types.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// File path
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// Configuration value out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field name
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Identity key file could not be read or written.
    #[error("Key file '{path}': {reason}")]
    KeyFile {
        /// File path
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The relay is full.
    #[error("Connection limit reached: max {limit} connections")]
    ConnectionLimitReached {
        /// Configured maximum
        limit: usize,
    },

    /// A transport is already attached to the connection.
    #[error("Transport already attached to connection {0}")]
    AlreadyAttached(ConnectionId),

    /// The connection's user was already set.
    #[error("User already identified on connection {0}")]
    UserAlreadySet(ConnectionId),

    /// No session key is known for the sender of a message.
    #[error("No session key for user {user_id}")]
    MissingSessionKey {
        /// Sender without a key
        user_id: UserId,
    },

    /// A frame claims to come from a different user than the connection's.
    #[error("Frame claims sender {claimed}, connection belongs to {actual}")]
    SenderMismatch {
        /// Id carried in the frame
        claimed: UserId,
        /// Id bound to the connection
        actual: UserId,
    },

    /// Server failed to start.
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Error from core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from transport crate.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `KeyFile` error.
    pub fn key_file(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::KeyFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for a closed transport.
    #[must_use]
    pub const fn closed() -> Self {
        Self::Transport(TransportError::Closed)
    }

    /// Returns `true` for configuration and key file problems.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::KeyFile { .. }
        )
    }

    /// Returns `true` if the transport underneath is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_closed())
    }

    /// Returns `true` if the session that hit this error must close.
    ///
    /// Everything else is a per-frame problem: the frame is dropped and
    /// the session continues.
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        match self {
            Self::Core(e) => e.is_fatal_to_session(),
            Self::AlreadyAttached(_) | Self::UserAlreadySet(_) | Self::Internal { .. } => true,
            _ => self.is_closed(),
        }
    }

    /// Returns `true` if the process cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::StartupFailed { .. }
        )
    }
}
