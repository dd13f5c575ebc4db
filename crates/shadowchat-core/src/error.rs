// ============================================
// File: crates/shadowchat-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types specific to the cipher, key exchange and wire
//! protocol operations in the ShadowChat core crate.
//!
//! ## Error Categories
//! 1. **Symmetric Errors**: Key size, random source, sealing and opening
//! 2. **Asymmetric Errors**: Key pair generation, key wrapping and unwrapping
//! 3. **Protocol Errors**: Envelope decoding and validation
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material or plaintext in error messages
//! - `AuthenticationFailed` covers both tampering and a wrong key; callers
//!   cannot and should not distinguish the two
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use shadowchat_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
///
/// # Security Note
/// Error messages are informative for debugging without revealing
/// key material or message content.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Symmetric Errors
    // ========================================

    /// The secure random source failed.
    #[error("Random source failure: {reason}")]
    RandomSource {
        /// Error reported by the source
        reason: String,
    },

    /// Symmetric key length is not 16, 24 or 32 bytes.
    #[error("Invalid key size: {size} bytes (expected 16, 24 or 32)")]
    InvalidKeySize {
        /// Rejected size in bytes
        size: usize,
    },

    /// Ciphertext is too short to contain a nonce.
    #[error("Malformed ciphertext: {len} bytes is shorter than the nonce")]
    MalformedCiphertext {
        /// Length received
        len: usize,
    },

    /// AEAD tag check failed (tampered data or wrong key).
    #[error("Authentication failed")]
    AuthenticationFailed,

    // ========================================
    // Asymmetric Errors
    // ========================================

    /// Failed to generate a key pair.
    #[error("Key generation failed: {context}")]
    KeyGeneration {
        /// What key was being generated
        context: String,
    },

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    /// Decryption operation failed.
    #[error("Decryption failed: {context}")]
    Decryption {
        /// What was being decrypted
        context: String,
    },

    /// Public key bytes could not be parsed.
    #[error("Invalid public key: {reason}")]
    InvalidPublicKey {
        /// What's wrong with the key
        reason: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Frame does not decode into a known envelope.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        /// What's wrong with the frame
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `RandomSource` error.
    pub fn random_source(reason: impl ToString) -> Self {
        Self::RandomSource {
            reason: reason.to_string(),
        }
    }

    /// Creates a `KeyGeneration` error.
    pub fn key_generation(context: impl Into<String>) -> Self {
        Self::KeyGeneration {
            context: context.into(),
        }
    }

    /// Creates an `Encryption` error.
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    /// Creates a `Decryption` error.
    pub fn decryption(context: impl Into<String>) -> Self {
        Self::Decryption {
            context: context.into(),
        }
    }

    /// Creates an `InvalidPublicKey` error.
    pub fn invalid_public_key(reason: impl ToString) -> Self {
        Self::InvalidPublicKey {
            reason: reason.to_string(),
        }
    }

    /// Creates a `ProtocolViolation` error.
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::RandomSource { .. }
                | Self::InvalidKeySize { .. }
                | Self::MalformedCiphertext { .. }
                | Self::AuthenticationFailed
                | Self::KeyGeneration { .. }
                | Self::Encryption { .. }
                | Self::Decryption { .. }
                | Self::InvalidPublicKey { .. }
        )
    }

    /// Returns `true` if this is a protocol error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    /// Returns `true` if the error ends the affected session.
    ///
    /// Setup failures close the session; per-message failures only drop
    /// the offending frame.
    #[must_use]
    pub const fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Self::RandomSource { .. }
                | Self::InvalidKeySize { .. }
                | Self::KeyGeneration { .. }
        )
    }
}

// ============================================
// Tests
// ============================================
