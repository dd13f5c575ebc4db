// ============================================
// File: crates/shadowchat-node/src/services/session.rs
// ============================================
//! # Session Handler
//!
//! ## Creation Reason
//! Drives one connection through the protocol state machine, running
//! the inbound and outbound pumps and delegating each decoded envelope
//! to a role (relay server or chat client).
//!
//! ## Main Functionality
//! - `SessionState`: Protocol states
//! - `SessionRole`: Per-role envelope handling
//! - `SessionHandler`: Pumps, decoding, error policy, teardown
//!
//! ## Session Lifecycle
//! ```text
//! ┌────────────┐ attach ┌──────────────────┐ username ┌─────────────────────┐
//! │ Connecting │ ─────► │ AwaitingUsername │ ───────► │ AwaitingKeyExchange │
//! └────────────┘        └────────┬─────────┘          └──────────┬──────────┘
//!                                │ bad frame                     │ key known
//!                                ▼                               ▼
//!                          ┌──────────┐   transport error  ┌──────────┐
//!                          │  Closed  │ ◄───────────────── │  Active  │
//!                          └──────────┘   close, timeout   └──────────┘
//! ```
//!
//! ## Error Policy
//! - A frame that fails to decode while awaiting the username closes the session
//! - Any later decode or handler error drops that frame only, including
//!   frames over the codec's size limit
//! - Errors classified `is_fatal_to_session` close the session
//!
//! ## ⚠️ Important Note for Next Developer
//! - `SessionRole::on_close` runs exactly once, on the inbound pump's exit path
//! - The outbound pump never blocks the inbound pump and vice versa
//!
//! ## Last Modified
//! v0.1.0 - Initial session handler

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use shadowchat_core::{Codec, Envelope, EnvelopeCodec};

use crate::error::Result;
use crate::services::connection::Connection;

/// How long teardown waits for the outbound pump to finish.
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// SessionState
// ============================================

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Transport not attached yet.
    Connecting,
    /// Waiting for the peer's `usernameMessage`.
    AwaitingUsername,
    /// Identified; no key material agreed yet.
    AwaitingKeyExchange,
    /// Keys available; messages flow.
    Active,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns the state name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AwaitingUsername => "awaiting_username",
            Self::AwaitingKeyExchange => "awaiting_key_exchange",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` once the peer is identified and not yet closed.
    #[must_use]
    pub const fn is_identified(&self) -> bool {
        matches!(self, Self::AwaitingKeyExchange | Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// SessionRole
// ============================================

/// Role-specific behavior plugged into a `SessionHandler`.
#[async_trait]
pub trait SessionRole: Send + Sync {
    /// Short role name for logs.
    fn name(&self) -> &'static str;

    /// Runs once the transport is attached, in `AwaitingUsername`.
    /// Returns the next state.
    async fn on_attach(&self, connection: &Connection) -> Result<SessionState>;

    /// Handles one decoded envelope. `frame` is the raw bytes it was
    /// decoded from. Returns the next state; `Closed` ends the session.
    async fn on_envelope(
        &self,
        connection: &Connection,
        state: SessionState,
        frame: Bytes,
        envelope: Envelope,
    ) -> Result<SessionState>;

    /// Runs exactly once when the session ends.
    async fn on_close(&self, connection: &Connection);
}

// ============================================
// SessionHandler
// ============================================

/// Per-connection protocol driver.
///
/// # Example
/// ```ignore
/// let handler = SessionHandler::new(connection, ServerRole::new(relay));
/// let state = handler.subscribe();
/// tokio::spawn(handler.run());
/// ```
pub struct SessionHandler<R> {
    connection: Arc<Connection>,
    role: R,
    state_tx: watch::Sender<SessionState>,
    codec: EnvelopeCodec,
    idle_timeout: Option<Duration>,
}

impl<R: SessionRole + 'static> SessionHandler<R> {
    /// Creates a handler for an attached connection.
    pub fn new(connection: Arc<Connection>, role: R) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        Self {
            connection,
            role,
            state_tx,
            codec: EnvelopeCodec::new(),
            idle_timeout: None,
        }
    }

    /// Decodes inbound frames with `codec` instead of the default.
    #[must_use]
    pub fn with_codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Closes the session after `timeout` without an inbound frame.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watches state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The connection this session drives.
    #[must_use]
    pub const fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Runs both pumps until the session closes. Returns `Closed`.
    pub async fn run(self) -> SessionState {
        let conn = Arc::clone(&self.connection);
        let id = conn.id();

        let Some(queue) = conn.take_outbound() else {
            warn!(connection_id = %id, "Outbound queue already taken; closing session");
            self.finish().await;
            return SessionState::Closed;
        };
        let mut writer = tokio::spawn(outbound_pump(Arc::clone(&conn), queue));

        self.transition(SessionState::AwaitingUsername);
        match self.role.on_attach(&conn).await {
            Ok(next) => {
                self.transition(next);
                self.inbound_pump().await;
            }
            Err(e) => warn!(connection_id = %id, role = self.role.name(), error = %e, "Session setup failed"),
        }

        self.finish().await;

        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, &mut writer).await.is_err() {
            warn!(connection_id = %id, "Outbound pump did not stop; aborting");
            writer.abort();
        }

        SessionState::Closed
    }

    async fn inbound_pump(&self) {
        let conn = &self.connection;
        let id = conn.id();

        loop {
            let state = self.state();
            if state == SessionState::Closed {
                break;
            }

            let received = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, conn.receive()).await {
                    Ok(result) => result,
                    Err(_) => {
                        info!(connection_id = %id, idle_secs = limit.as_secs(), "Idle timeout");
                        break;
                    }
                },
                None => conn.receive().await,
            };

            let frame = match received {
                Ok(frame) => frame,
                Err(e) if e.is_closed() => {
                    debug!(connection_id = %id, "Transport closed");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "Transport error");
                    break;
                }
            };

            trace!(connection_id = %id, len = frame.len(), state = %state, "Frame received");

            let envelope = match self.codec.decode(&frame) {
                Ok(envelope) => envelope,
                Err(e) if state == SessionState::AwaitingUsername => {
                    warn!(connection_id = %id, error = %e, "Undecodable frame before username; closing");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %id, state = %state, error = %e, "Dropping malformed frame");
                    continue;
                }
            };

            let message_type = envelope.message_type();
            match self.role.on_envelope(conn, state, frame, envelope).await {
                Ok(next) => self.transition(next),
                Err(e) if e.is_fatal_to_session() => {
                    warn!(connection_id = %id, %message_type, error = %e, "Fatal session error");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %id, %message_type, error = %e, "Dropping frame");
                }
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(
                connection_id = %self.connection.id(),
                role = self.role.name(),
                from = %previous,
                to = %next,
                "Session state changed"
            );
        }
    }

    async fn finish(&self) {
        self.transition(SessionState::Closed);
        self.role.on_close(&self.connection).await;
        if let Err(e) = self.connection.close().await {
            debug!(connection_id = %self.connection.id(), error = %e, "Error closing connection");
        }
    }
}

impl<R: SessionRole> fmt::Debug for SessionHandler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandler")
            .field("connection", &self.connection.id())
            .field("role", &self.role.name())
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

// ============================================
// Outbound Pump
// ============================================

/// Drains the connection's queue to its transport until either closes.
async fn outbound_pump(conn: Arc<Connection>, mut queue: mpsc::Receiver<Bytes>) {
    loop {
        let frame = tokio::select! {
            frame = queue.recv() => frame,
            () = conn.closed() => None,
        };
        let Some(frame) = frame else { break };

        let written = conn.write(frame).await;
        conn.frame_written();
        if let Err(e) = written {
            if !e.is_closed() {
                warn!(connection_id = %conn.id(), error = %e, "Write failed");
            }
            if let Err(e) = conn.close().await {
                debug!(connection_id = %conn.id(), error = %e, "Error closing connection");
            }
            break;
        }
    }
    trace!(connection_id = %conn.id(), "Outbound pump exiting");
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shadowchat_common::UserId;
    use shadowchat_core::protocol::{encode_envelope, TextMessagePayload, UsernamePayload};
    use shadowchat_transport::{FrameTransport, MemoryTransport};

    use crate::error::NodeError;
    use crate::services::connection::User;

    /// Echoes every envelope back and counts closes.
    #[derive(Default)]
    struct EchoRole {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionRole for EchoRole {
        fn name(&self) -> &'static str {
            "echo"
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
            match envelope {
                Envelope::Username(p) => {
                    let id = UserId::new(p.username.clone())?;
                    connection.set_user(User::new(id, p.username, None))?;
                    connection.send(frame).await?;
                    Ok(SessionState::Active)
                }
                _ if state == SessionState::Active => {
                    connection.send(frame).await?;
                    Ok(state)
                }
                _ => Err(NodeError::internal("unexpected frame")),
            }
        }

        async fn on_close(&self, _connection: &Connection) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start(role: EchoRole) -> (MemoryTransport, watch::Receiver<SessionState>, tokio::task::JoinHandle<SessionState>) {
        let (local, remote) = MemoryTransport::pair();
        let conn = Arc::new(Connection::with_transport(Arc::new(local), 16));
        let handler = SessionHandler::new(conn, role);
        let state = handler.subscribe();
        let task = tokio::spawn(handler.run());
        (remote, state, task)
    }

    fn username_frame(name: &str) -> Bytes {
        encode_envelope(&Envelope::Username(UsernamePayload::new(name))).unwrap()
    }

    async fn wait_for(state: &mut watch::Receiver<SessionState>, wanted: SessionState) {
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn test_pumps_run_and_close_once() {
        let role = EchoRole::default();
        let closes = Arc::clone(&role.closes);
        let (remote, mut state, task) = start(role);

        remote.send(username_frame("alice")).await.unwrap();
        assert_eq!(remote.recv().await.unwrap(), username_frame("alice"));
        wait_for(&mut state, SessionState::Active).await;

        remote.close().await.unwrap();
        assert_eq!(task.await.unwrap(), SessionState::Closed);
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_active_session() {
        let (remote, mut state, task) = start(EchoRole::default());

        remote.send(username_frame("bob")).await.unwrap();
        remote.recv().await.unwrap();
        wait_for(&mut state, SessionState::Active).await;

        remote.send(Bytes::from_static(b"{not json")).await.unwrap();
        remote.send(Bytes::from_static(b"{\"type\":\"bogus\",\"payload\":{}}")).await.unwrap();
        let text = encode_envelope(&Envelope::Text(TextMessagePayload::sealed(
            UserId::new("bob").unwrap(),
            None,
            b"sealed",
        )))
        .unwrap();
        remote.send(text.clone()).await.unwrap();

        assert_eq!(remote.recv().await.unwrap(), text);
        assert_eq!(*state.borrow(), SessionState::Active);
        assert!(!task.is_finished());

        remote.close().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_before_username_closes() {
        let (remote, mut state, task) = start(EchoRole::default());

        remote.send(Bytes::from_static(b"garbage")).await.unwrap();
        wait_for(&mut state, SessionState::Closed).await;
        task.await.unwrap();
        assert!(remote.recv().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_fatal_error_closes() {
        let (remote, mut state, task) = start(EchoRole::default());

        remote.send(username_frame("carol")).await.unwrap();
        remote.recv().await.unwrap();
        wait_for(&mut state, SessionState::Active).await;

        // A second username hits `set_user` again, which is fatal.
        remote.send(username_frame("carol")).await.unwrap();
        wait_for(&mut state, SessionState::Closed).await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_closes() {
        let (local, _remote) = MemoryTransport::pair();
        let conn = Arc::new(Connection::with_transport(Arc::new(local), 16));
        let handler = SessionHandler::new(Arc::clone(&conn), EchoRole::default())
            .with_idle_timeout(Some(Duration::from_millis(50)));

        let result = tokio::time::timeout(Duration::from_secs(2), handler.run())
            .await
            .expect("idle session should close");
        assert_eq!(result, SessionState::Closed);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_dropped() {
        let (local, remote) = MemoryTransport::pair();
        let conn = Arc::new(Connection::with_transport(Arc::new(local), 16));
        let handler = SessionHandler::new(conn, EchoRole::default())
            .with_codec(EnvelopeCodec::with_max_frame_size(512));
        let mut state = handler.subscribe();
        let task = tokio::spawn(handler.run());

        remote.send(username_frame("carol")).await.unwrap();
        remote.recv().await.unwrap();
        wait_for(&mut state, SessionState::Active).await;

        let sender = UserId::new("carol").unwrap();
        let big = encode_envelope(&Envelope::Text(TextMessagePayload::sealed(
            sender.clone(),
            None,
            &[7u8; 2048],
        )))
        .unwrap();
        let small = encode_envelope(&Envelope::Text(TextMessagePayload::sealed(sender, None, b"ok")))
            .unwrap();
        assert!(big.len() > 512 && small.len() <= 512);

        remote.send(big).await.unwrap();
        remote.send(small.clone()).await.unwrap();

        assert_eq!(remote.recv().await.unwrap(), small);
        assert_eq!(*state.borrow(), SessionState::Active);

        remote.close().await.unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::AwaitingKeyExchange.to_string(), "awaiting_key_exchange");
        assert!(SessionState::Active.is_identified());
        assert!(!SessionState::AwaitingUsername.is_identified());
        assert!(!SessionState::Closed.is_identified());
    }
}
