// ============================================
// File: crates/shadowchat-node/src/client.rs
// ============================================
//! # Chat Client
//!
//! ## Creation Reason
//! Wraps a [`ClientRole`] session behind a handle the CLI (or any other
//! front end) can drive: send text, read decrypted events, close.
//!
//! ## Main Functionality
//! - `Client`: resolves the identity and dials the relay
//! - `ClientHandle`: per-peer encryption and event delivery
//!
//! ## Client Flow
//! ```text
//!   Client::connect
//!     │  identity (key file or fresh)
//!     │  dial ws://…/ws
//!     ▼
//!   SessionHandler<ClientRole> ──spawn──► pumps
//!     │
//!     ▼
//!   ClientHandle
//!     send_text ──► one textMessage per keyed peer (recipientID set)
//!     next_event ◄── ChatEvent
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `send_text` only reaches peers whose session key is already agreed
//! - Dialing retries only errors the transport reports as retryable
//! - `close` lets queued frames drain for up to `CLOSE_GRACE` first
//! - Dropping the handle without `close` leaves the task to finish on
//!   its own when the relay hangs up
//!
//! ## Last Modified
//! v0.1.0 - Initial client

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shadowchat_common::UserId;
use shadowchat_core::protocol::{encode_envelope, EnvelopeCodec, TextMessagePayload};
use shadowchat_core::{CipherEngine, Envelope, KeyPair, KeyStore};
use shadowchat_transport::{dial, ClientTransport, FrameTransport};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::handlers::{ChatEvent, ClientRole};
use crate::identity;
use crate::services::{Connection, SessionHandler, SessionState};

/// Capacity of the event channel towards the front end.
const EVENT_CAPACITY: usize = 256;

/// How long `close` waits for the queue to drain, and then for the
/// session task.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Dial attempts before giving up on a retryable error.
const DIAL_ATTEMPTS: u32 = 3;

/// Backoff step between dial attempts; grows linearly.
const DIAL_BACKOFF: Duration = Duration::from_millis(200);

// ============================================
// Client
// ============================================

/// Builder for a chat session.
pub struct Client {
    config: NodeConfig,
    username: String,
    user_id: UserId,
    identity: Option<KeyPair>,
}

impl Client {
    /// Creates a client with a random user id.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the username is empty.
    pub fn new(config: NodeConfig, username: impl Into<String>) -> Result<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(NodeError::config_invalid("username", "must not be empty"));
        }
        Ok(Self {
            config,
            username,
            user_id: UserId::generate(),
            identity: None,
        })
    }

    /// Uses a fixed user id instead of a random one.
    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    /// Uses the given key pair instead of loading or generating one.
    #[must_use]
    pub fn with_identity(mut self, identity: KeyPair) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the user id this client announces.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Dials the configured relay and starts the session.
    ///
    /// # Errors
    /// Returns an error if the identity cannot be resolved or the relay
    /// cannot be reached.
    pub async fn connect(mut self) -> Result<ClientHandle> {
        if self.identity.is_none() {
            let bits = self.config.crypto.rsa_bits;
            let resolved = match &self.config.client.key_file {
                Some(path) => identity::load_or_generate(path, bits).await?,
                None => identity::generate(bits).await?,
            };
            self.identity = Some(resolved);
        }

        let url = self.config.client.server_url.clone();
        info!(url = %url, user_id = %self.user_id, "Connecting to relay");
        let transport = dial_with_retry(&url).await?;
        self.start(Arc::new(transport)).await
    }

    /// Starts the session over an already connected transport.
    ///
    /// # Errors
    /// Returns an error if no identity is available and one cannot be
    /// generated, or if the transport is unusable.
    pub async fn start(self, transport: Arc<dyn FrameTransport>) -> Result<ClientHandle> {
        let identity = match self.identity {
            Some(identity) => identity,
            None => identity::generate(self.config.crypto.rsa_bits).await?,
        };

        let connection = Arc::new(Connection::new(self.config.limits.outbound_queue_capacity));
        connection.attach_transport(transport)?;

        let keys = Arc::new(KeyStore::new());
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let role = ClientRole::new(
            self.user_id.clone(),
            self.username,
            identity,
            Arc::clone(&keys),
            self.config.crypto.session_key_size,
            events_tx,
        )?;

        let handler = SessionHandler::new(Arc::clone(&connection), role)
            .with_codec(EnvelopeCodec::with_max_frame_size(self.config.limits.max_frame_size));
        let state = handler.subscribe();
        let task = tokio::spawn(handler.run());

        Ok(ClientHandle {
            user_id: self.user_id,
            connection,
            keys,
            events: events_rx,
            state,
            task,
        })
    }
}

/// Dials `url`, retrying refused or interrupted connects.
async fn dial_with_retry(url: &str) -> Result<ClientTransport> {
    let mut attempt = 1;
    loop {
        match dial(url).await {
            Ok(transport) => return Ok(transport),
            Err(e) if e.is_retryable() && attempt < DIAL_ATTEMPTS => {
                let backoff = DIAL_BACKOFF * attempt;
                warn!(url = %url, attempt, error = %e, backoff_ms = backoff.as_millis(), "Dial failed; retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("server_url", &self.config.client.server_url)
            .finish_non_exhaustive()
    }
}

// ============================================
// ClientHandle
// ============================================

/// A running chat session.
pub struct ClientHandle {
    user_id: UserId,
    connection: Arc<Connection>,
    keys: Arc<KeyStore>,
    events: mpsc::Receiver<ChatEvent>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionState>,
}

impl ClientHandle {
    /// Returns this client's user id.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Peers that currently share a session key, sorted.
    #[must_use]
    pub fn keyed_peers(&self) -> Vec<UserId> {
        self.keys.keyed_users()
    }

    /// Encrypts `text` once per keyed peer and queues the frames.
    ///
    /// Returns how many peers the message was sent to.
    ///
    /// # Errors
    /// Returns an error if the session is closed or encryption fails.
    pub async fn send_text(&self, text: &str) -> Result<usize> {
        if self.connection.is_closed() {
            return Err(NodeError::closed());
        }

        let peers = self.keys.keyed_users();
        let mut sent = 0;
        for peer in peers {
            let Some(key) = self.keys.symmetric_key(&peer) else {
                continue;
            };
            let ciphertext = CipherEngine::new(&key)?.encrypt(text.as_bytes())?;
            let payload = TextMessagePayload::sealed(self.user_id.clone(), Some(peer.clone()), &ciphertext);
            self.connection.send(encode_envelope(&Envelope::Text(payload))?).await?;
            sent += 1;
        }

        if sent == 0 {
            debug!("No keyed peers; message not sent");
        }
        Ok(sent)
    }

    /// Returns the event receiver.
    pub fn events(&mut self) -> &mut mpsc::Receiver<ChatEvent> {
        &mut self.events
    }

    /// Waits for the next event; `None` once the session is gone.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Waits until the session reaches `target` or closes.
    ///
    /// Returns the state that ended the wait.
    pub async fn wait_for_state(&mut self, target: SessionState) -> SessionState {
        match self
            .state
            .wait_for(|s| *s == target || *s == SessionState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => SessionState::Closed,
        }
    }

    /// Lets queued frames drain, then closes the session and waits for
    /// it to finish.
    ///
    /// # Errors
    /// Returns an error if closing the transport fails.
    pub async fn close(self) -> Result<SessionState> {
        if tokio::time::timeout(CLOSE_GRACE, self.connection.flush()).await.is_err() {
            warn!(queued = self.connection.queued(), "Outbound queue did not drain; closing anyway");
        }
        self.connection.close().await?;
        match tokio::time::timeout(CLOSE_GRACE, self.task).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(e)) => Err(NodeError::internal(format!("session task failed: {e}"))),
            Err(_) => {
                warn!("Session did not finish in time");
                Ok(SessionState::Closed)
            }
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("keyed_peers", &self.keys.symmetric_key_count())
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

    use bytes::Bytes;
    use shadowchat_core::protocol::decode_envelope;
    use shadowchat_transport::{MemoryTransport, WsListener};

    fn key_pair() -> KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| KeyPair::generate(1024).unwrap()).clone()
    }

    fn client(name: &str) -> Client {
        Client::new(NodeConfig::default(), name)
            .unwrap()
            .with_user_id(UserId::new(name).unwrap())
            .with_identity(key_pair())
    }

    #[test]
    fn test_empty_username_rejected() {
        let err = Client::new(NodeConfig::default(), "  ").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_random_user_ids() {
        let a = Client::new(NodeConfig::default(), "a").unwrap();
        let b = Client::new(NodeConfig::default(), "a").unwrap();
        assert_ne!(a.user_id(), b.user_id());
    }

    #[tokio::test]
    async fn test_start_announces_and_waits_for_keys() {
        let (local, remote) = MemoryTransport::pair();
        let mut handle = client("alice").start(Arc::new(local)).await.unwrap();

        let hello = decode_envelope(&remote.recv().await.unwrap()).unwrap();
        assert!(matches!(hello, Envelope::Username(_)));
        let request = decode_envelope(&remote.recv().await.unwrap()).unwrap();
        assert!(matches!(request, Envelope::PublicKeyExchange(ref p) if p.need_public_key));

        assert_eq!(
            handle.wait_for_state(SessionState::AwaitingKeyExchange).await,
            SessionState::AwaitingKeyExchange
        );
        assert_eq!(handle.send_text("nobody here").await.unwrap(), 0);
        assert!(handle.keyed_peers().is_empty());

        assert_eq!(handle.close().await.unwrap(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_drains_queued_frames() {
        let (local, remote) = MemoryTransport::pair();
        let handle = client("alice").start(Arc::new(local)).await.unwrap();

        let frames: Vec<Bytes> = (0..100)
            .map(|i| Bytes::from(format!("frame-{i}")))
            .collect();
        for frame in &frames {
            handle.connection.send(frame.clone()).await.unwrap();
        }
        assert_eq!(handle.close().await.unwrap(), SessionState::Closed);

        let mut received = Vec::new();
        while let Ok(frame) = remote.recv().await {
            received.push(frame);
        }
        // Username announcement and key request precede the queued frames
        assert!(received.len() >= frames.len());
        assert_eq!(received[received.len() - frames.len()..], frames[..]);
    }

    #[tokio::test]
    async fn test_connect_gives_up_on_refused_relay() {
        // Free a port so nothing is listening on it
        let listener = WsListener::bind("127.0.0.1:0".parse().unwrap(), "/ws").await.unwrap();
        let addr = listener.local_addr();
        drop(listener);

        let mut config = NodeConfig::default();
        config.client.server_url = format!("ws://{addr}/ws");
        let client = Client::new(config, "alice").unwrap().with_identity(key_pair());

        let started = std::time::Instant::now();
        let err = client.connect().await.unwrap_err();
        assert!(
            matches!(err, NodeError::Transport(ref t) if t.is_retryable()),
            "got {err:?}"
        );
        assert!(started.elapsed() >= DIAL_BACKOFF * 3, "retries back off between attempts");
    }

    #[tokio::test]
    async fn test_remote_hangup_emits_disconnected() {
        let (local, remote) = MemoryTransport::pair();
        let mut handle = client("alice").start(Arc::new(local)).await.unwrap();

        remote.close().await.unwrap();
        loop {
            match handle.next_event().await {
                Some(ChatEvent::Disconnected) | None => break,
                Some(_) => {}
            }
        }
        assert_eq!(handle.wait_for_state(SessionState::Closed).await, SessionState::Closed);
        assert_eq!(handle.close().await.unwrap(), SessionState::Closed);
    }
}
