// ============================================
// File: crates/shadowchat-node/src/handlers/client_role.rs
// ============================================
//! # Chat Client Role
//!
//! ## Creation Reason
//! Runs the client side of the protocol: announces the user, agrees a
//! session key with every peer over RSA-OAEP, and decrypts incoming
//! text for the rendering side.
//!
//! ## Key Agreement
//! ```text
//!   a (smaller id, provider)                      b
//!   │                                              │
//!   │◄──── publicKeyExchange {pk_b, need: true} ───│  on attach
//!   │ store pk_b                                   │
//!   │ generate K, wrap under pk_b                  │
//!   │───── publicKeyExchange {pk_a, need: false, ─►│
//!   │        recipientID: b, encryptedKey}         │ unwrap K
//!   │                                              │
//!   ╞════════ textMessage (AES-GCM under K) ═══════╡
//! ```
//! Only the side with the smaller user id generates the pair key, so
//! crossed requests still converge on one key.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never log plaintext or key bytes; fingerprints only
//! - A `needPublicKey` request from a known peer means it restarted;
//!   its old session key is discarded
//!
//! ## Last Modified
//! v0.1.0 - Initial client role

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use shadowchat_common::UserId;
use shadowchat_core::protocol::{
    encode_envelope, PublicKeyExchangePayload, TextMessagePayload, UsernamePayload,
};
use shadowchat_core::{CipherEngine, CoreError, Envelope, KeyExchange, KeyPair, KeyStore, SymmetricKey};

use crate::error::{NodeError, Result};
use crate::services::connection::{Connection, User};
use crate::services::session::{SessionRole, SessionState};

/// Notice shown when a group frame arrives.
pub const GROUP_UNAVAILABLE: &str = "group feature is not available";

// ============================================
// ChatEvent
// ============================================

/// Events delivered to the rendering side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A decrypted message.
    Message {
        /// Author
        sender_id: UserId,
        /// Plaintext
        text: String,
    },
    /// A session key is now shared with this peer.
    PeerKeyed {
        /// Peer id
        user_id: UserId,
    },
    /// Informational notice.
    Notice(String),
    /// The session ended.
    Disconnected,
}

// ============================================
// ClientRole
// ============================================

/// Client-side session role.
pub struct ClientRole {
    user: User,
    public_key: Vec<u8>,
    identity: KeyPair,
    keys: Arc<KeyStore>,
    session_key_size: usize,
    events: mpsc::Sender<ChatEvent>,
}

impl ClientRole {
    /// Creates the role.
    ///
    /// # Errors
    /// Returns an error if the identity's public key cannot be encoded.
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        identity: KeyPair,
        keys: Arc<KeyStore>,
        session_key_size: usize,
        events: mpsc::Sender<ChatEvent>,
    ) -> Result<Self> {
        let public_key = KeyExchange::export_public_key(&identity)?;
        let user = User::new(user_id, username, Some(public_key.clone()));
        Ok(Self {
            user,
            public_key,
            identity,
            keys,
            session_key_size,
            events,
        })
    }

    /// Returns this client's user.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    fn me(&self) -> &UserId {
        &self.user.id
    }

    /// The smaller id issues the pair key.
    fn is_provider_for(&self, peer: &UserId) -> bool {
        self.me() < peer
    }

    fn key_exchange(&self, need_public_key: bool, recipient_id: Option<UserId>, encrypted_key: Option<Vec<u8>>) -> Envelope {
        Envelope::PublicKeyExchange(PublicKeyExchangePayload {
            public_key: self.public_key.clone(),
            need_public_key,
            user_id: self.me().clone(),
            recipient_id,
            encrypted_key,
        })
    }

    async fn emit(&self, event: ChatEvent) {
        if self.events.send(event).await.is_err() {
            trace!("Event receiver dropped");
        }
    }

    fn current_state(&self) -> SessionState {
        if self.keys.symmetric_key_count() > 0 {
            SessionState::Active
        } else {
            SessionState::AwaitingKeyExchange
        }
    }

    // ========================================
    // Handlers
    // ========================================

    async fn on_public_key(&self, connection: &Connection, payload: PublicKeyExchangePayload) -> Result<()> {
        let peer = payload.user_id.clone();
        if peer == *self.me() || !payload.is_for(self.me()) {
            trace!(peer_id = %peer, "Key exchange not addressed to us");
            return Ok(());
        }

        KeyExchange::parse_public_key(&payload.public_key)?;
        let changed = self
            .keys
            .public_key(&peer)
            .is_some_and(|known| known != payload.public_key);
        if changed {
            info!(
                peer_id = %peer,
                fingerprint = %KeyExchange::fingerprint(&payload.public_key),
                "Peer key changed"
            );
        }
        if (changed || payload.need_public_key) && self.keys.remove_symmetric_key(&peer).is_some() {
            debug!(peer_id = %peer, "Peer restarted key exchange; dropped old session key");
        }
        debug!(
            peer_id = %peer,
            fingerprint = %KeyExchange::fingerprint(&payload.public_key),
            "Stored peer public key"
        );
        self.keys.put_public_key(peer.clone(), payload.public_key.clone());

        if let Some(wrapped) = &payload.encrypted_key {
            let key = KeyExchange::unwrap_session_key(&self.identity, wrapped).map_err(|e| match e {
                CoreError::InvalidKeySize { size } => {
                    CoreError::decryption(format!("unwrapped session key has invalid size {size}"))
                }
                other => other,
            })?;
            self.keys.put_symmetric_key(peer.clone(), key);
            info!(peer_id = %peer, "Session key received");
            self.emit(ChatEvent::PeerKeyed { user_id: peer.clone() }).await;
        }

        let mut issued: Option<SymmetricKey> = None;
        let mut encrypted_key = None;
        if self.is_provider_for(&peer) && !self.keys.has_symmetric_key(&peer) {
            let key = SymmetricKey::generate(self.session_key_size)?;
            encrypted_key = Some(KeyExchange::wrap_session_key(&payload.public_key, &key)?);
            issued = Some(key);
        }

        if payload.need_public_key || encrypted_key.is_some() {
            let reply = self.key_exchange(false, Some(peer.clone()), encrypted_key);
            connection.send(encode_envelope(&reply)?).await?;
        }

        if let Some(key) = issued {
            self.keys.put_symmetric_key(peer.clone(), key);
            info!(peer_id = %peer, key_size = self.session_key_size, "Session key issued");
            self.emit(ChatEvent::PeerKeyed { user_id: peer }).await;
        }
        Ok(())
    }

    async fn on_text(&self, payload: TextMessagePayload) -> Result<()> {
        let sender = &payload.sender_id;
        if sender == self.me() || !payload.is_for(self.me()) {
            trace!(sender_id = %sender, "Text not addressed to us");
            return Ok(());
        }

        let key = self
            .keys
            .symmetric_key(sender)
            .ok_or_else(|| NodeError::MissingSessionKey {
                user_id: sender.clone(),
            })?;

        let ciphertext = payload.ciphertext()?;
        let plaintext = CipherEngine::new(&key)?.decrypt(&ciphertext)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| CoreError::protocol_violation("textMessage plaintext is not UTF-8"))?;

        debug!(sender_id = %sender, len = text.len(), "Message decrypted");
        self.emit(ChatEvent::Message {
            sender_id: payload.sender_id,
            text,
        })
        .await;
        Ok(())
    }
}

#[async_trait]
impl SessionRole for ClientRole {
    fn name(&self) -> &'static str {
        "client"
    }

    async fn on_attach(&self, connection: &Connection) -> Result<SessionState> {
        connection.set_user(self.user.clone())?;

        let mut hello = UsernamePayload::new(self.user.username.clone());
        hello.user_id = Some(self.me().clone());
        hello.public_key = Some(self.public_key.clone());
        connection.send(encode_envelope(&Envelope::Username(hello))?).await?;

        connection
            .send(encode_envelope(&self.key_exchange(true, None, None))?)
            .await?;

        info!(
            user_id = %self.me(),
            fingerprint = %KeyExchange::fingerprint(&self.public_key),
            "Announced identity"
        );
        Ok(SessionState::AwaitingKeyExchange)
    }

    async fn on_envelope(
        &self,
        connection: &Connection,
        _state: SessionState,
        _frame: Bytes,
        envelope: Envelope,
    ) -> Result<SessionState> {
        match envelope {
            Envelope::PublicKeyExchange(payload) => self.on_public_key(connection, payload).await?,
            Envelope::Text(payload) => self.on_text(payload).await?,
            Envelope::InviteToGroup(_) | Envelope::AcceptInvite(_) => {
                info!("Group feature is not available");
                self.emit(ChatEvent::Notice(GROUP_UNAVAILABLE.to_string())).await;
            }
            Envelope::Username(payload) => {
                trace!(username_len = payload.username.len(), "Ignoring peer usernameMessage");
            }
        }
        Ok(self.current_state())
    }

    async fn on_close(&self, _connection: &Connection) {
        self.keys.clear();
        info!(user_id = %self.me(), "Disconnected from relay");
        self.emit(ChatEvent::Disconnected).await;
    }
}

impl std::fmt::Debug for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRole")
            .field("user", &self.user)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use shadowchat_core::protocol::{decode_envelope, InviteToGroupPayload};

    fn key_pair(slot: usize) -> KeyPair {
        static PAIRS: OnceLock<Vec<KeyPair>> = OnceLock::new();
        PAIRS
            .get_or_init(|| (0..3).map(|_| KeyPair::generate(1024).unwrap()).collect())[slot]
            .clone()
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    struct Side {
        role: ClientRole,
        conn: Connection,
        queue: mpsc::Receiver<Bytes>,
        events: mpsc::Receiver<ChatEvent>,
        keys: Arc<KeyStore>,
    }

    fn side(id: &str, slot: usize) -> Side {
        let keys = Arc::new(KeyStore::new());
        let (tx, events) = mpsc::channel(16);
        let role = ClientRole::new(uid(id), id, key_pair(slot), Arc::clone(&keys), 32, tx).unwrap();
        let conn = Connection::new(16);
        let queue = conn.take_outbound().unwrap();
        Side { role, conn, queue, events, keys }
    }

    impl Side {
        async fn deliver(&self, frame: &Bytes) -> Result<SessionState> {
            let envelope = decode_envelope(frame).unwrap();
            self.role
                .on_envelope(&self.conn, SessionState::AwaitingKeyExchange, frame.clone(), envelope)
                .await
        }

        fn sent(&mut self) -> Vec<Bytes> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.queue.try_recv() {
                frames.push(frame);
            }
            frames
        }

        fn request(&self) -> Bytes {
            encode_envelope(&self.role.key_exchange(true, None, None)).unwrap()
        }

        fn seal_for(&self, peer: &str, text: &str) -> Bytes {
            let key = self.keys.symmetric_key(&uid(peer)).unwrap();
            let ct = CipherEngine::new(&key).unwrap().encrypt(text.as_bytes()).unwrap();
            let payload = TextMessagePayload::sealed(self.role.me().clone(), Some(uid(peer)), &ct);
            encode_envelope(&Envelope::Text(payload)).unwrap()
        }
    }

    fn as_exchange(frame: &Bytes) -> PublicKeyExchangePayload {
        match decode_envelope(frame).unwrap() {
            Envelope::PublicKeyExchange(p) => p,
            other => panic!("expected publicKeyExchange, got {other:?}"),
        }
    }

    /// Runs the exchange until neither side has anything left to send.
    async fn agree(a: &mut Side, b: &mut Side, first: Bytes, first_to_a: bool) {
        let mut pending = vec![(first, first_to_a)];
        while let Some((frame, to_a)) = pending.pop() {
            let (target, other_is_a) = if to_a { (&mut *a, false) } else { (&mut *b, true) };
            target.deliver(&frame).await.unwrap();
            for reply in target.sent() {
                pending.push((reply, other_is_a));
            }
        }
    }

    #[tokio::test]
    async fn test_attach_announces_identity() {
        let mut a = side("alice", 0);
        assert_eq!(a.role.on_attach(&a.conn).await.unwrap(), SessionState::AwaitingKeyExchange);

        let frames = a.sent();
        assert_eq!(frames.len(), 2);
        match decode_envelope(&frames[0]).unwrap() {
            Envelope::Username(p) => {
                assert_eq!(p.username, "alice");
                assert_eq!(p.user_id, Some(uid("alice")));
                assert!(p.public_key.is_some());
            }
            other => panic!("expected usernameMessage, got {other:?}"),
        }
        let request = as_exchange(&frames[1]);
        assert!(request.need_public_key);
        assert_eq!(request.recipient_id, None);
        assert_eq!(a.conn.user_id(), Some(&uid("alice")));
    }

    #[tokio::test]
    async fn test_provider_answers_request_with_key() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);

        a.deliver(&b.request()).await.unwrap();
        let replies = a.sent();
        assert_eq!(replies.len(), 1);
        let reply = as_exchange(&replies[0]);
        assert!(!reply.need_public_key);
        assert_eq!(reply.recipient_id, Some(uid("bob")));
        assert!(reply.encrypted_key.is_some());

        assert_eq!(b.deliver(&replies[0]).await.unwrap(), SessionState::Active);
        assert!(b.sent().is_empty());

        let ka = a.keys.symmetric_key(&uid("bob")).unwrap();
        let kb = b.keys.symmetric_key(&uid("alice")).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(a.events.try_recv().unwrap(), ChatEvent::PeerKeyed { user_id: uid("bob") });
        assert_eq!(b.events.try_recv().unwrap(), ChatEvent::PeerKeyed { user_id: uid("alice") });
    }

    #[tokio::test]
    async fn test_non_provider_request_still_converges() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);

        let request = a.request();
        agree(&mut a, &mut b, request, false).await;

        let ka = a.keys.symmetric_key(&uid("bob")).unwrap();
        let kb = b.keys.symmetric_key(&uid("alice")).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka.size(), 32);
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        while b.events.try_recv().is_ok() {}

        let frame = a.seal_for("bob", "hello");
        assert_eq!(b.deliver(&frame).await.unwrap(), SessionState::Active);
        assert_eq!(
            b.events.try_recv().unwrap(),
            ChatEvent::Message { sender_id: uid("alice"), text: "hello".into() }
        );
    }

    #[tokio::test]
    async fn test_text_without_key_is_rejected() {
        let a = side("alice", 0);
        let frame = encode_envelope(&Envelope::Text(TextMessagePayload::sealed(
            uid("zed"),
            None,
            &[0u8; 40],
        )))
        .unwrap();

        let err = a.deliver(&frame).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingSessionKey { .. }));
        assert!(!err.is_fatal_to_session());
    }

    #[tokio::test]
    async fn test_tampered_text_is_rejected() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        while b.events.try_recv().is_ok() {}

        let key = a.keys.symmetric_key(&uid("bob")).unwrap();
        let mut ct = CipherEngine::new(&key).unwrap().encrypt(b"secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        let frame = encode_envelope(&Envelope::Text(TextMessagePayload::sealed(
            uid("alice"),
            Some(uid("bob")),
            &ct,
        )))
        .unwrap();

        let err = b.deliver(&frame).await.unwrap_err();
        assert!(matches!(err, NodeError::Core(CoreError::AuthenticationFailed)));
        assert!(b.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frames_for_other_recipients_ignored() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let mut c = side("carol", 2);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        let reply_for_bob = encode_envelope(&a.role.key_exchange(false, Some(uid("bob")), None)).unwrap();

        c.deliver(&reply_for_bob).await.unwrap();
        assert!(c.keys.public_key(&uid("alice")).is_none());
        assert!(c.sent().is_empty());

        let text_for_bob = a.seal_for("bob", "private");
        c.deliver(&text_for_bob).await.unwrap();
        assert!(c.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_request_replaces_key() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        let old = a.keys.symmetric_key(&uid("bob")).unwrap();

        let mut b2 = side("bob", 1);
        let request = b2.request();
        agree(&mut a, &mut b2, request, true).await;

        let new = a.keys.symmetric_key(&uid("bob")).unwrap();
        assert_ne!(old, new);
        assert_eq!(new, b2.keys.symmetric_key(&uid("alice")).unwrap());
    }

    #[tokio::test]
    async fn test_reconnect_with_new_identity_replaces_keys() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        let old = a.keys.symmetric_key(&uid("bob")).unwrap();

        // Same id, different key pair, announced without asking for a reply
        let mut b2 = side("bob", 2);
        let announce = encode_envelope(&b2.role.key_exchange(false, Some(uid("alice")), None)).unwrap();
        let spki = as_exchange(&announce).public_key;
        agree(&mut a, &mut b2, announce, true).await;

        assert_eq!(a.keys.public_key(&uid("bob")), Some(spki));
        let new = a.keys.symmetric_key(&uid("bob")).unwrap();
        assert_ne!(old, new);
        assert_eq!(new, b2.keys.symmetric_key(&uid("alice")).unwrap());

        let sealed = b2.seal_for("alice", "back again");
        a.deliver(&sealed).await.unwrap();
        let mut last = None;
        while let Ok(event) = a.events.try_recv() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(ChatEvent::Message { sender_id: uid("bob"), text: "back again".into() })
        );
    }

    #[tokio::test]
    async fn test_group_frames_emit_notice() {
        let mut a = side("alice", 0);
        let frame = encode_envelope(&Envelope::InviteToGroup(InviteToGroupPayload::default())).unwrap();

        a.deliver(&frame).await.unwrap();
        assert_eq!(a.events.try_recv().unwrap(), ChatEvent::Notice(GROUP_UNAVAILABLE.into()));
    }

    #[tokio::test]
    async fn test_close_clears_keys() {
        let mut a = side("alice", 0);
        let mut b = side("bob", 1);
        let request = b.request();
        agree(&mut a, &mut b, request, true).await;
        while a.events.try_recv().is_ok() {}

        a.role.on_close(&a.conn).await;
        assert_eq!(a.keys.symmetric_key_count(), 0);
        assert_eq!(a.keys.public_key_count(), 0);
        assert_eq!(a.events.try_recv().unwrap(), ChatEvent::Disconnected);
    }
}
