// ============================================
// File: crates/shadowchat-node/src/handlers/server_role.rs
// ============================================
//! # Relay Server Role
//!
//! ## Creation Reason
//! Handles envelopes arriving at the relay: binds the user from the
//! username handshake, records announced public keys and forwards
//! application frames to every other peer.
//!
//! ## Frame Handling
//! ```text
//! AwaitingUsername ── usernameMessage ──► bind User
//!                  │                      public key known? ─► Active
//!                  │                      otherwise ─────────► AwaitingKeyExchange
//!                  └─ anything else ────► Closed
//!
//! AwaitingKeyExchange / Active
//!   usernameMessage ────────► dropped (user is immutable)
//!   publicKeyExchange ──────► record key, forward, Active
//!   textMessage / group ────► forward
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Forwarded frames are the exact bytes received, never re-encoded
//! - Never log message content here; the relay only sees ciphertext anyway
//!
//! ## Last Modified
//! v0.1.0 - Initial relay role

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use shadowchat_common::UserId;
use shadowchat_core::protocol::UsernamePayload;
use shadowchat_core::{Envelope, KeyExchange};

use crate::error::{NodeError, Result};
use crate::services::connection::{Connection, User};
use crate::services::relay::Relay;
use crate::services::session::{SessionRole, SessionState};

// ============================================
// ServerRole
// ============================================

/// Relay-side session role.
pub struct ServerRole {
    relay: Arc<Relay>,
}

impl ServerRole {
    /// Creates the role for one session on `relay`.
    #[must_use]
    pub const fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    fn identify(&self, connection: &Connection, payload: UsernamePayload) -> Result<SessionState> {
        let user_id = payload.user_id.unwrap_or_else(UserId::generate);

        let public_key = match payload.public_key {
            Some(key) => match KeyExchange::parse_public_key(&key) {
                Ok(_) => Some(key),
                Err(e) => {
                    warn!(connection_id = %connection.id(), error = %e, "Ignoring invalid public key in usernameMessage");
                    None
                }
            },
            None => None,
        };

        let user = User::new(user_id.clone(), payload.username, public_key.clone());
        connection.set_user(user)?;

        let next = if let Some(key) = public_key {
            info!(
                connection_id = %connection.id(),
                user_id = %user_id,
                fingerprint = %KeyExchange::fingerprint(&key),
                "User identified"
            );
            self.relay.directory().put_public_key(user_id, key);
            SessionState::Active
        } else {
            info!(connection_id = %connection.id(), user_id = %user_id, "User identified");
            SessionState::AwaitingKeyExchange
        };
        Ok(next)
    }

    async fn forward(
        &self,
        connection: &Connection,
        state: SessionState,
        frame: Bytes,
        envelope: &Envelope,
    ) -> Result<SessionState> {
        let Some(user) = connection.user() else {
            return Err(NodeError::internal("identified state without a user"));
        };

        let claimed = match envelope {
            Envelope::PublicKeyExchange(p) => Some(&p.user_id),
            Envelope::Text(p) => Some(&p.sender_id),
            _ => None,
        };
        if let Some(claimed) = claimed {
            if *claimed != user.id {
                return Err(NodeError::SenderMismatch {
                    claimed: claimed.clone(),
                    actual: user.id.clone(),
                });
            }
        }

        let mut next = state;
        if let Envelope::PublicKeyExchange(p) = envelope {
            KeyExchange::parse_public_key(&p.public_key)?;
            self.relay
                .directory()
                .put_public_key(user.id.clone(), p.public_key.clone());
            if state != SessionState::Active {
                info!(connection_id = %connection.id(), user_id = %user.id, "Public key received");
            }
            next = SessionState::Active;
        }

        let recipients = self.relay.broadcast(connection.id(), frame).await;
        debug!(
            connection_id = %connection.id(),
            user_id = %user.id,
            message_type = %envelope.message_type(),
            recipients,
            "Frame forwarded"
        );
        Ok(next)
    }
}

#[async_trait]
impl SessionRole for ServerRole {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn on_attach(&self, _connection: &Connection) -> Result<SessionState> {
        Ok(SessionState::AwaitingUsername)
    }

    async fn on_envelope(
        &self,
        connection: &Connection,
        state: SessionState,
        frame: Bytes,
        envelope: Envelope,
    ) -> Result<SessionState> {
        match (state, envelope) {
            (SessionState::AwaitingUsername, Envelope::Username(payload)) => {
                self.identify(connection, payload)
            }
            (SessionState::AwaitingUsername, other) => {
                warn!(
                    connection_id = %connection.id(),
                    message_type = %other.message_type(),
                    "Expected usernameMessage; closing"
                );
                Ok(SessionState::Closed)
            }
            (_, Envelope::Username(_)) => {
                warn!(connection_id = %connection.id(), "Ignoring repeated usernameMessage");
                Ok(state)
            }
            (_, envelope) => self.forward(connection, state, frame, &envelope).await,
        }
    }

    async fn on_close(&self, connection: &Connection) {
        self.relay.deregister(connection.id());
        if let Some(user) = connection.user() {
            self.relay.directory().remove_user(&user.id);
            info!(connection_id = %connection.id(), user_id = %user.id, "Session closed");
        } else {
            info!(connection_id = %connection.id(), "Session closed before identification");
        }
    }
}

impl std::fmt::Debug for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRole").field("relay", &self.relay).finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Duration;

    use shadowchat_core::protocol::{encode_envelope, PublicKeyExchangePayload, TextMessagePayload};
    use shadowchat_core::KeyPair;
    use shadowchat_transport::{FrameTransport, MemoryTransport};
    use tokio::sync::watch;

    use crate::services::session::SessionHandler;

    fn test_public_key() -> Vec<u8> {
        static KEY: OnceLock<Vec<u8>> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate(1024).unwrap().public_key_der().unwrap())
            .clone()
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    struct Peer {
        remote: MemoryTransport,
        state: watch::Receiver<SessionState>,
        conn: Arc<Connection>,
    }

    fn join(relay: &Arc<Relay>) -> Peer {
        let (local, remote) = MemoryTransport::pair();
        let conn = Arc::new(Connection::with_transport(Arc::new(local), 16));
        relay.register(&conn).unwrap();
        let handler = SessionHandler::new(Arc::clone(&conn), ServerRole::new(Arc::clone(relay)));
        let state = handler.subscribe();
        tokio::spawn(handler.run());
        Peer { remote, state, conn }
    }

    async fn identify(peer: &mut Peer, id: &str, public_key: Option<Vec<u8>>) {
        let mut payload = UsernamePayload::new(id);
        payload.user_id = Some(uid(id));
        payload.public_key = public_key;
        peer.remote
            .send(encode_envelope(&Envelope::Username(payload)).unwrap())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), peer.state.wait_for(|s| s.is_identified()))
            .await
            .unwrap()
            .unwrap();
    }

    fn text_from(sender: &str) -> Bytes {
        encode_envelope(&Envelope::Text(TextMessagePayload::sealed(
            uid(sender),
            None,
            b"0123456789abcdef-ciphertext",
        )))
        .unwrap()
    }

    async fn recv(peer: &Peer) -> Bytes {
        tokio::time::timeout(Duration::from_secs(2), peer.remote.recv())
            .await
            .expect("frame expected")
            .unwrap()
    }

    async fn assert_silent(peer: &Peer) {
        let result = tokio::time::timeout(Duration::from_millis(100), peer.remote.recv()).await;
        assert!(result.is_err(), "no frame expected");
    }

    #[tokio::test]
    async fn test_username_binds_user_and_key() {
        let relay = Arc::new(Relay::new(10));
        let mut alice = join(&relay);

        identify(&mut alice, "alice", Some(test_public_key())).await;
        assert_eq!(*alice.state.borrow(), SessionState::Active);
        assert_eq!(alice.conn.user_id(), Some(&uid("alice")));
        assert!(relay.directory().public_key(&uid("alice")).is_some());
    }

    #[tokio::test]
    async fn test_public_key_exchange_activates_and_forwards() {
        let relay = Arc::new(Relay::new(10));
        let mut alice = join(&relay);
        let mut bob = join(&relay);
        identify(&mut alice, "alice", None).await;
        identify(&mut bob, "bob", None).await;
        assert_eq!(*alice.state.borrow(), SessionState::AwaitingKeyExchange);

        let exchange = encode_envelope(&Envelope::PublicKeyExchange(PublicKeyExchangePayload {
            public_key: test_public_key(),
            need_public_key: true,
            user_id: uid("alice"),
            recipient_id: None,
            encrypted_key: None,
        }))
        .unwrap();
        alice.remote.send(exchange.clone()).await.unwrap();

        assert_eq!(recv(&bob).await, exchange);
        tokio::time::timeout(Duration::from_secs(2), alice.state.wait_for(|s| *s == SessionState::Active))
            .await
            .unwrap()
            .unwrap();
        assert!(relay.directory().public_key(&uid("alice")).is_some());
    }

    #[tokio::test]
    async fn test_text_forwarded_to_others_only() {
        let relay = Arc::new(Relay::new(10));
        let mut peers = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let mut peer = join(&relay);
            identify(&mut peer, name, Some(test_public_key())).await;
            peers.push(peer);
        }

        let frame = text_from("alice");
        peers[0].remote.send(frame.clone()).await.unwrap();

        assert_eq!(recv(&peers[1]).await, frame);
        assert_eq!(recv(&peers[2]).await, frame);
        assert_silent(&peers[0]).await;
    }

    #[tokio::test]
    async fn test_spoofed_sender_is_dropped() {
        let relay = Arc::new(Relay::new(10));
        let mut alice = join(&relay);
        let mut bob = join(&relay);
        identify(&mut alice, "alice", Some(test_public_key())).await;
        identify(&mut bob, "bob", Some(test_public_key())).await;

        alice.remote.send(text_from("bob")).await.unwrap();
        assert_silent(&bob).await;
        assert_eq!(*alice.state.borrow(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_non_username_first_frame_closes() {
        let relay = Arc::new(Relay::new(10));
        let mut mallory = join(&relay);

        mallory.remote.send(text_from("mallory")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), mallory.state.wait_for(|s| *s == SessionState::Closed))
            .await
            .unwrap()
            .unwrap();
        assert!(relay.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_username_ignored() {
        let relay = Arc::new(Relay::new(10));
        let mut alice = join(&relay);
        let bob = join(&relay);
        identify(&mut alice, "alice", Some(test_public_key())).await;

        let again = encode_envelope(&Envelope::Username(UsernamePayload::new("eve"))).unwrap();
        alice.remote.send(again).await.unwrap();
        assert_silent(&bob).await;
        assert_eq!(alice.conn.user().unwrap().username, "alice");
        assert_eq!(*alice.state.borrow(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_close_deregisters_and_forgets_key() {
        let relay = Arc::new(Relay::new(10));
        let mut alice = join(&relay);
        identify(&mut alice, "alice", Some(test_public_key())).await;
        assert_eq!(relay.len(), 1);

        alice.remote.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), alice.state.wait_for(|s| *s == SessionState::Closed))
            .await
            .unwrap()
            .unwrap();
        assert!(relay.is_empty());
        assert!(relay.directory().public_key(&uid("alice")).is_none());
    }
}
