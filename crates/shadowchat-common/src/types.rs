// ============================================
// File: crates/shadowchat-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers used throughout ShadowChat so that a
//! connection handle and a chat participant can never be confused.
//!
//! ## Main Functionality
//! - `ConnectionId`: Per-transport identifier (UUID v4), never leaves the relay
//! - `UserId`: Participant identifier carried on the wire as `userID`/`senderID`
//!
//! ## Main Logical Flow
//! 1. `ConnectionId` is minted when the relay accepts a transport
//! 2. `UserId` is minted by the client (or by the relay if the client sent none)
//! 3. Both are used as keys in the relay registry and the key store
//!
//! ## ⚠️ Important Note for Next Developer
//! - `UserId` compares lexicographically; the key agreement depends on it
//! - Serialization of both types is a plain string, keep it that way
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommonError;

// ============================================
// ConnectionId
// ============================================

/// Identifier of one accepted or dialed transport.
///
/// # Example
/// ```
/// use shadowchat_common::types::ConnectionId;
///
/// let a = ConnectionId::generate();
/// let b = ConnectionId::generate();
/// assert_ne!(a, b);
///
/// let parsed: ConnectionId = a.to_string().parse().unwrap();
/// assert_eq!(a, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random `ConnectionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is enough to tell connections apart in logs
        let s = self.0.simple().to_string();
        write!(f, "ConnectionId({}...)", &s[..8])
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ConnectionId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CommonError::invalid_input("connection_id", e.to_string()))
    }
}

// ============================================
// UserId
// ============================================

/// Identifier of a chat participant.
///
/// Any non-empty string is accepted from the wire; locally generated
/// ids are hyphenated UUID v4 strings.
///
/// # Example
/// ```
/// use shadowchat_common::types::UserId;
///
/// let alice = UserId::new("alice").unwrap();
/// let bob = UserId::new("bob").unwrap();
/// assert!(alice < bob);
/// assert!(UserId::new("").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId` from a string, rejecting empty values.
    ///
    /// # Errors
    /// Returns `CommonError::InvalidInput` if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, CommonError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CommonError::invalid_input("user_id", "cannot be empty"));
        }
        Ok(Self(id))
    }

    /// Generates a fresh random `UserId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================
// Tests
// ============================================
