// ============================================
// File: crates/shadowchat-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes all cryptographic operations for ShadowChat, using
//! audited RustCrypto implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`cipher`]: Symmetric AEAD (AES-GCM) over message payloads
//! - [`exchange`]: RSA-OAEP key pairs used to wrap session keys
//! - [`keystore`]: Per-user public keys and session keys
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Key Exchange Phase                         │
//! │  Peer A (smaller id)                         Peer B         │
//! │    │                                              │         │
//! │    │  SPKI public key (needPublicKey) ──────────► │         │
//! │    │ ◄────────────────────────── SPKI public key  │         │
//! │    │                                              │         │
//! │    │  generate AES key K                          │         │
//! │    │  RSA-OAEP(B.public, K) ────────────────────► │         │
//! │    │                                   unwrap → K │         │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Messaging Phase                          │
//! │                                                             │
//! │   K + random nonce ──► AES-GCM ──► nonce ‖ ciphertext ‖ tag │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own crypto
//! - Nonces come from the OS RNG on every call, never from a counter
//! - ALL secret keys implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod cipher;
pub mod exchange;
pub mod keystore;

// Re-export primary types at module level
pub use cipher::{CipherEngine, SymmetricKey};
pub use exchange::{KeyExchange, KeyPair};
pub use keystore::KeyStore;

// ============================================
// Constants
// ============================================

/// Size of the AES-GCM nonce prepended to every ciphertext.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Accepted symmetric key sizes (AES-128, AES-192, AES-256).
pub const VALID_KEY_SIZES: [usize; 3] = [16, 24, 32];

/// Session key size used when none is configured.
pub const DEFAULT_SESSION_KEY_SIZE: usize = 32;

/// Smallest accepted RSA modulus.
pub const MIN_RSA_BITS: usize = 1024;

/// Largest accepted RSA modulus.
pub const MAX_RSA_BITS: usize = 8192;

/// RSA modulus used when none is configured.
pub const DEFAULT_RSA_BITS: usize = 2048;
