// ============================================
// File: crates/shadowchat-core/src/lib.rs
// ============================================
//! # ShadowChat Core - Protocol & Cryptography Library
//!
//! ## Creation Reason
//! Provides the wire protocol and the cryptographic operations that keep
//! chat messages confidential between peers, independent of any I/O.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Tagged envelope (`usernameMessage`, `publicKeyExchange`, `textMessage`, ...)
//! - JSON codec with strict tag checking
//!
//! ### Crypto Module ([`crypto`])
//! - `CipherEngine`: AES-GCM with a random nonce per message
//! - `KeyExchange`: RSA-OAEP wrapping of session keys
//! - `KeyStore`: Per-peer public keys and session keys
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               shadowchat-node                       │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │  shadowchat-core  ◄──  shadowchat-transport         │
//! │  You are here                 │                     │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │           shadowchat-common                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Confidentiality**: AES-GCM under a key only the two peers hold
//! - **Integrity**: GCM tag checked before any plaintext is returned
//! - **Relay blindness**: The relay only ever sees ciphertext and public keys
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto implementations
//! - ALL secret keys MUST implement Zeroize
//! - There is no forward secrecy; a leaked RSA key exposes its session keys
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

// Re-export commonly used items
pub use crypto::{CipherEngine, KeyExchange, KeyPair, KeyStore, SymmetricKey};
pub use error::{CoreError, Result};
pub use protocol::{Codec, Envelope, EnvelopeCodec, MessageType};
