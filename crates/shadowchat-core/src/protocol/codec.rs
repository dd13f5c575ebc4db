// ============================================
// File: crates/shadowchat-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Turns envelopes into transport frames and back, enforcing the closed
//! set of message types at the boundary.
//!
//! ## Main Functionality
//! - `Codec` trait: Generic encode/decode interface
//! - `EnvelopeCodec`: JSON implementation for [`Envelope`]
//!
//! ## Parsing Strategy
//! 1. Check the frame size limit
//! 2. Parse the outer `{type, payload}` object
//! 3. Unwrap a string-embedded payload if present
//! 4. Decode directly into the variant matching the tag
//! 5. Validate payload invariants
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every decode failure is a `ProtocolViolation`; callers rely on that
//!   to drop the frame and keep the session alive
//! - Never log frame contents, they may hold ciphertext or keys
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use shadowchat_common::CommonError;

use crate::error::{CoreError, Result};
use crate::protocol::messages::{Envelope, MessageType};

// ============================================
// Constants
// ============================================

/// Largest frame the codec will decode (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into one frame.
    ///
    /// # Errors
    /// Returns an error if the message cannot be serialized.
    fn encode(&self, msg: &T) -> Result<Bytes>;

    /// Decodes one frame.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if the frame is not a valid message.
    fn decode(&self, frame: &[u8]) -> Result<T>;
}

// ============================================
// EnvelopeCodec
// ============================================

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// JSON codec for [`Envelope`].
///
/// # Example
/// ```
/// use shadowchat_core::protocol::{Codec, EnvelopeCodec, Envelope, UsernamePayload};
///
/// let codec = EnvelopeCodec::new();
/// let frame = codec.encode(&Envelope::Username(UsernamePayload::new("alice"))).unwrap();
/// let decoded = codec.decode(&frame).unwrap();
/// assert!(matches!(decoded, Envelope::Username(p) if p.username == "alice"));
/// ```
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame_size: usize,
}

impl EnvelopeCodec {
    /// Creates a codec with the default frame size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Creates a codec with a custom frame size limit.
    #[must_use]
    pub const fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Returns the frame size limit.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn payload<T: DeserializeOwned>(kind: MessageType, payload: Value) -> Result<T> {
        // Payloads may arrive double-encoded as a JSON string
        let payload = match payload {
            Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
                CoreError::protocol_violation(format!("{kind}: invalid embedded payload: {e}"))
            })?,
            other => other,
        };

        serde_json::from_value(payload)
            .map_err(|e| CoreError::protocol_violation(format!("{kind}: {e}")))
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_tag(tag: &str) -> CoreError {
    // Bound the echoed tag, it is attacker controlled
    let shown: String = tag.chars().take(32).collect();
    CoreError::protocol_violation(format!("unknown message type '{shown}'"))
}

impl Codec<Envelope> for EnvelopeCodec {
    fn encode(&self, msg: &Envelope) -> Result<Bytes> {
        let json = serde_json::to_vec(msg)
            .map_err(|e| CommonError::encoding(msg.message_type().as_tag(), e))?;
        Ok(Bytes::from(json))
    }

    fn decode(&self, frame: &[u8]) -> Result<Envelope> {
        if frame.len() > self.max_frame_size {
            return Err(CoreError::protocol_violation(format!(
                "frame of {} bytes exceeds the {}-byte limit",
                frame.len(),
                self.max_frame_size
            )));
        }

        let raw: RawEnvelope = serde_json::from_slice(frame)
            .map_err(|e| CoreError::protocol_violation(format!("invalid envelope: {e}")))?;
        let kind = MessageType::from_tag(&raw.kind).ok_or_else(|| unknown_tag(&raw.kind))?;

        let envelope = match kind {
            MessageType::UsernameMessage => Envelope::Username(Self::payload(kind, raw.payload)?),
            MessageType::PublicKeyExchange => {
                Envelope::PublicKeyExchange(Self::payload(kind, raw.payload)?)
            }
            MessageType::TextMessage => Envelope::Text(Self::payload(kind, raw.payload)?),
            MessageType::InviteToGroup => {
                Envelope::InviteToGroup(Self::payload(kind, raw.payload)?)
            }
            MessageType::AcceptInvite => Envelope::AcceptInvite(Self::payload(kind, raw.payload)?),
        };

        envelope.validate()?;
        Ok(envelope)
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Encodes an envelope with the default codec.
///
/// # Errors
/// See [`Codec::encode`].
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes> {
    EnvelopeCodec::new().encode(envelope)
}

/// Decodes a frame with the default codec.
///
/// # Errors
/// See [`Codec::decode`].
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope> {
    EnvelopeCodec::new().decode(frame)
}

// ============================================
// Tests
// ============================================
