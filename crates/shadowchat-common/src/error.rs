// ============================================
// File: crates/shadowchat-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides foundational error types and result aliases used across
//! all ShadowChat crates.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for common operations
//! - `Result<T>`: Type alias using `CommonError`
//! - Error conversion traits for interoperability
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include key material or message plaintext in error messages
//! - Implement `From` traits for seamless error propagation
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across ShadowChat crates.
///
/// # Example
/// ```
/// use shadowchat_common::error::{CommonError, Result};
///
/// fn validate_username(name: &str) -> Result<()> {
///     if name.is_empty() {
///         return Err(CommonError::invalid_input("username", "cannot be empty"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    // ========================================
    // Validation Errors
    // ========================================

    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    // ========================================
    // Encoding Errors
    // ========================================

    /// Failed to encode/serialize data.
    #[error("Encoding error: {context}: {details}")]
    Encoding {
        /// What was being encoded
        context: String,
        /// Error details
        details: String,
    },
}

impl CommonError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Encoding` error.
    pub fn encoding(context: impl Into<String>, details: impl ToString) -> Self {
        Self::Encoding {
            context: context.into(),
            details: details.to_string(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error was caused by bad input from a peer
    /// or caller rather than a local failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_input("username", "cannot be empty");
        assert!(err.to_string().contains("username"));
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CommonError::invalid_input("user_id", "empty").is_client_error());
        assert!(!CommonError::encoding("textMessage", "bad").is_client_error());
    }

    #[test]
    fn test_encoding_error_keeps_context() {
        let err = CommonError::encoding("publicKeyExchange", "key must be a string");
        assert!(err.to_string().contains("publicKeyExchange"));
        assert!(err.to_string().contains("key must be a string"));
    }
}
