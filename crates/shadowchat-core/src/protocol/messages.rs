// ============================================
// File: crates/shadowchat-core/src/protocol/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines every message exchanged between chat clients through the
//! relay, as a closed set of tagged variants.
//!
//! ## Main Functionality
//! - `MessageType`: The five wire tags
//! - Payload structs, one per message type
//! - `Envelope`: Tagged union of all payloads
//!
//! ## Wire Format (JSON)
//! ```text
//! { "type": "textMessage",
//!   "payload": { "content": "<base64 nonce‖sealed>", "senderID": "..." } }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field names are fixed by deployed clients (note `Username`, `userID`)
//! - New fields must be optional so older peers keep decoding
//! - Byte fields are standard base64 strings
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize};

use shadowchat_common::UserId;

use crate::error::{CoreError, Result};

// ============================================
// MessageType
// ============================================

/// Wire tag identifying an envelope's payload.
///
/// | Tag | Direction |
/// |-----|-----------|
/// | `usernameMessage` | client → relay |
/// | `publicKeyExchange` | client → peers |
/// | `textMessage` | client → peers |
/// | `inviteToGroup` | client → peers |
/// | `acceptInvite` | client → peers |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Announces the sender's username.
    UsernameMessage,
    /// Carries a public key and, optionally, a wrapped session key.
    PublicKeyExchange,
    /// Carries an encrypted chat message.
    TextMessage,
    /// Group invitation (not supported yet).
    InviteToGroup,
    /// Group invitation acceptance (not supported yet).
    AcceptInvite,
}

impl MessageType {
    /// All message types in wire order.
    pub const ALL: [Self; 5] = [
        Self::UsernameMessage,
        Self::PublicKeyExchange,
        Self::TextMessage,
        Self::InviteToGroup,
        Self::AcceptInvite,
    ];

    /// Parses a wire tag.
    ///
    /// # Returns
    /// `None` if the tag is unknown.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_tag() == tag)
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn as_tag(&self) -> &'static str {
        match self {
            Self::UsernameMessage => "usernameMessage",
            Self::PublicKeyExchange => "publicKeyExchange",
            Self::TextMessage => "textMessage",
            Self::InviteToGroup => "inviteToGroup",
            Self::AcceptInvite => "acceptInvite",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

// ============================================
// Serde Helpers
// ============================================

mod b64 {
    use super::{Deserialize, Deserializer, Engine, BASE64};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use super::{Deserialize, Deserializer, Engine, BASE64};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&BASE64.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) if !s.is_empty() => BASE64
                .decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Older clients send `""` for an absent id.
fn empty_as_none<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<String>,
    T::Error: fmt::Display,
{
    match Option::<String>::deserialize(d)? {
        Some(s) if !s.is_empty() => T::try_from(s).map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

// ============================================
// Payloads
// ============================================

/// `usernameMessage` payload, sent once right after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernamePayload {
    /// Display name chosen by the user.
    #[serde(rename = "Username")]
    pub username: String,

    /// Id the client picked for itself; the relay assigns one if absent.
    #[serde(
        rename = "userID",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<UserId>,

    /// SPKI DER public key of the client.
    #[serde(
        rename = "publicKey",
        default,
        with = "b64_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key: Option<Vec<u8>>,
}

impl UsernamePayload {
    /// Creates a payload carrying only a username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: None,
            public_key: None,
        }
    }
}

/// `publicKeyExchange` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyExchangePayload {
    /// SPKI DER public key of the sender.
    #[serde(rename = "publicKey", with = "b64")]
    pub public_key: Vec<u8>,

    /// Asks the receiver to answer with its own public key.
    #[serde(rename = "needPublicKey", default)]
    pub need_public_key: bool,

    /// Sender of this payload.
    #[serde(rename = "userID")]
    pub user_id: UserId,

    /// Peer this reply is meant for; `None` means everyone.
    #[serde(
        rename = "recipientID",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_id: Option<UserId>,

    /// Session key wrapped under the recipient's public key.
    #[serde(
        rename = "encryptedKey",
        default,
        with = "b64_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_key: Option<Vec<u8>>,
}

impl PublicKeyExchangePayload {
    /// Returns `true` if this payload is addressed to `me` or to everyone.
    #[must_use]
    pub fn is_for(&self, me: &UserId) -> bool {
        self.recipient_id.as_ref().map_or(true, |r| r == me)
    }
}

/// `textMessage` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessagePayload {
    /// Base64 of `nonce ‖ sealed`.
    pub content: String,

    /// Author of the message.
    #[serde(rename = "senderID")]
    pub sender_id: UserId,

    /// Group the message belongs to, if any.
    #[serde(
        rename = "groupID",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<String>,

    /// Peer whose session key sealed `content`.
    #[serde(
        rename = "recipientID",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_id: Option<UserId>,
}

impl TextMessagePayload {
    /// Builds a payload around an already sealed ciphertext.
    #[must_use]
    pub fn sealed(sender_id: UserId, recipient_id: Option<UserId>, ciphertext: &[u8]) -> Self {
        Self {
            content: BASE64.encode(ciphertext),
            sender_id,
            group_id: None,
            recipient_id,
        }
    }

    /// Decodes `content` back into `nonce ‖ sealed` bytes.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if `content` is not valid base64.
    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.content)
            .map_err(|e| CoreError::protocol_violation(format!("textMessage content: {e}")))
    }

    /// Returns `true` if this payload is addressed to `me` or to everyone.
    #[must_use]
    pub fn is_for(&self, me: &UserId) -> bool {
        self.recipient_id.as_ref().map_or(true, |r| r == me)
    }
}

/// User reference embedded in group payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUser {
    /// User id.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Display name.
    #[serde(rename = "Username", default)]
    pub username: String,
}

/// `inviteToGroup` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteToGroupPayload {
    /// Group display name.
    #[serde(default)]
    pub group_name: String,
    /// Invited user.
    #[serde(rename = "inviteeID", default)]
    pub invitee_id: String,
    /// Group key wrapped for the invitee.
    #[serde(default, with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<Vec<u8>>,
    /// Group identifier.
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    /// Who sent the invitation.
    #[serde(default)]
    pub inviter_user: GroupUser,
}

/// `acceptInvite` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitePayload {
    /// Group identifier.
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    /// Group display name.
    #[serde(default)]
    pub group_name: String,
    /// Group key wrapped for the accepting user.
    #[serde(default, with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<Vec<u8>>,
    /// Who sent the original invitation.
    #[serde(default)]
    pub inviter_user: GroupUser,
}

// ============================================
// Envelope
// ============================================

/// One decoded frame.
///
/// Serializes as `{"type": <tag>, "payload": {...}}`. Decoding goes
/// through [`crate::protocol::codec`], which also accepts payloads
/// embedded as JSON strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Envelope {
    /// `usernameMessage`
    #[serde(rename = "usernameMessage")]
    Username(UsernamePayload),
    /// `publicKeyExchange`
    #[serde(rename = "publicKeyExchange")]
    PublicKeyExchange(PublicKeyExchangePayload),
    /// `textMessage`
    #[serde(rename = "textMessage")]
    Text(TextMessagePayload),
    /// `inviteToGroup`
    #[serde(rename = "inviteToGroup")]
    InviteToGroup(InviteToGroupPayload),
    /// `acceptInvite`
    #[serde(rename = "acceptInvite")]
    AcceptInvite(AcceptInvitePayload),
}

impl Envelope {
    /// Returns the wire tag of this envelope.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Username(_) => MessageType::UsernameMessage,
            Self::PublicKeyExchange(_) => MessageType::PublicKeyExchange,
            Self::Text(_) => MessageType::TextMessage,
            Self::InviteToGroup(_) => MessageType::InviteToGroup,
            Self::AcceptInvite(_) => MessageType::AcceptInvite,
        }
    }

    /// Checks payload invariants that serde cannot express.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` on an empty username or public key.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Username(p) if p.username.trim().is_empty() => {
                Err(CoreError::protocol_violation("usernameMessage: empty Username"))
            }
            Self::PublicKeyExchange(p) if p.public_key.is_empty() => {
                Err(CoreError::protocol_violation("publicKeyExchange: empty publicKey"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn test_message_type_tags() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::from_tag(t.as_tag()), Some(t));
        }
        assert_eq!(MessageType::from_tag("TextMessage"), None);
        assert_eq!(MessageType::from_tag(""), None);
    }

    #[test]
    fn test_username_payload_field_names() {
        let json = serde_json::to_value(UsernamePayload::new("alice")).unwrap();
        assert_eq!(json, serde_json::json!({ "Username": "alice" }));
    }

    #[test]
    fn test_public_key_payload_base64() {
        let payload = PublicKeyExchangePayload {
            public_key: vec![0xDE, 0xAD, 0xBE, 0xEF],
            need_public_key: true,
            user_id: uid("u1"),
            recipient_id: None,
            encrypted_key: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["publicKey"], "3q2+7w==");
        assert_eq!(json["needPublicKey"], true);
        assert_eq!(json["userID"], "u1");
        assert!(json.get("recipientID").is_none());
        assert!(json.get("encryptedKey").is_none());
    }

    #[test]
    fn test_text_payload_empty_group_is_none() {
        let payload: TextMessagePayload = serde_json::from_str(
            r#"{"content":"AAAA","senderID":"s","groupID":"","recipientID":""}"#,
        )
        .unwrap();
        assert_eq!(payload.group_id, None);
        assert_eq!(payload.recipient_id, None);
        assert!(payload.is_for(&uid("anyone")));
    }

    #[test]
    fn test_text_payload_ciphertext() {
        let payload = TextMessagePayload::sealed(uid("a"), Some(uid("b")), &[1, 2, 3]);
        assert_eq!(payload.ciphertext().unwrap(), vec![1, 2, 3]);
        assert!(payload.is_for(&uid("b")));
        assert!(!payload.is_for(&uid("c")));

        let bad = TextMessagePayload {
            content: "%%%".into(),
            ..payload
        };
        assert!(bad.ciphertext().unwrap_err().is_protocol_error());
    }

    #[test]
    fn test_envelope_serializes_tagged() {
        let env = Envelope::Username(UsernamePayload::new("bob"));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "usernameMessage");
        assert_eq!(json["payload"]["Username"], "bob");
        assert_eq!(env.message_type(), MessageType::UsernameMessage);
    }

    #[test]
    fn test_envelope_validate() {
        assert!(Envelope::Username(UsernamePayload::new("  ")).validate().is_err());
        assert!(Envelope::Username(UsernamePayload::new("ok")).validate().is_ok());
        assert!(Envelope::InviteToGroup(InviteToGroupPayload::default())
            .validate()
            .is_ok());
    }
}
