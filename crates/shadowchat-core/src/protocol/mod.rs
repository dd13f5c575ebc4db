// ============================================
// File: crates/shadowchat-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the wire protocol spoken between ShadowChat clients through
//! the relay: a JSON envelope with a type tag and a typed payload.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`messages`]: Message types, payloads and the `Envelope` union
//! - [`codec`]: Frame encoding/decoding
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Join Phase                               │
//! │  Client ──────── usernameMessage ──────────────────► Relay  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  Key Exchange Phase                         │
//! │  Client ──── publicKeyExchange ──► Relay ──► every peer     │
//! │  Client ◄─── publicKeyExchange ─── Relay ◄── each peer      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  Messaging Phase                            │
//! │  Client ════ textMessage (AES-GCM) ══ Relay ══ every peer   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The relay forwards frames byte for byte; it never re-encodes
//! - Field names on the wire are fixed, see `messages`
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;

// Re-export primary types
pub use codec::{decode_envelope, encode_envelope, Codec, EnvelopeCodec, MAX_FRAME_SIZE};
pub use messages::{
    AcceptInvitePayload, Envelope, GroupUser, InviteToGroupPayload, MessageType,
    PublicKeyExchangePayload, TextMessagePayload, UsernamePayload,
};
