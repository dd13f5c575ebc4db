// ============================================
// File: crates/shadowchat-transport/src/websocket.rs
// ============================================
//! # WebSocket Transport Implementation
//!
//! ## Creation Reason
//! Carries chat envelopes as WebSocket text frames between clients and the
//! relay, wrapping `tokio-tungstenite` with our `FrameTransport` trait.
//!
//! ## Main Functionality
//! - `WsListener`: TCP listener with the HTTP upgrade on a single path
//! - `WsTransport`: Full-duplex frame transport over an upgraded stream
//! - `dial`: Client-side connect to a `ws://` URL
//!
//! ## Connection Flow
//! ```text
//! Client                                Relay
//!   │                                     │
//!   │─── TCP connect ────────────────────►│ WsListener::accept
//!   │─── GET /ws (Upgrade) ──────────────►│ WsListener::upgrade
//!   │◄── 101 Switching Protocols ─────────│   (404 on other paths)
//!   │                                     │
//!   │◄══════════ text frames ════════════►│ WsTransport
//!   │                                     │
//!   │─── Close ──────────────────────────►│ recv() -> Closed
//! ```
//!
//! ## Design Choices
//! - Uses SO_REUSEADDR for quick rebinding after restart
//! - Reader and writer halves sit behind separate locks so the inbound
//!   and outbound pumps never wait on each other
//! - Ping and pong frames are handled by tungstenite and never surface
//!
//! ## ⚠️ Important Note for Next Developer
//! - Upgrading happens outside the accept loop; see `WsListener::upgrade`
//! - `close()` waits at most `CLOSE_TIMEOUT` for the close frame to flush
//!
//! ## Last Modified
//! v0.1.0 - Initial WebSocket transport implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::FrameTransport;

/// Upper bound on how long `close()` waits for the close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Listen backlog for the relay socket.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================
// WsTransport
// ============================================

/// WebSocket-based frame transport.
///
/// Generic over the underlying stream so the same type serves accepted
/// TCP streams on the relay and dialed streams on the client.
pub struct WsTransport<S> {
    /// Writer half
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    /// Reader half
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    /// Remote address, when known
    peer_addr: Option<SocketAddr>,
    /// Closed flag
    closed: AtomicBool,
    /// Wakes a pending `recv` on local close
    closed_tx: watch::Sender<bool>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already-upgraded WebSocket stream.
    #[must_use]
    pub fn new(ws: WebSocketStream<S>, peer_addr: Option<SocketAddr>) -> Self {
        let (sink, stream) = ws.split();
        let (closed_tx, _) = watch::channel(false);
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            peer_addr,
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }
}

#[async_trait]
impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&self) -> Result<Bytes> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Err(TransportError::Closed);
        }

        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = closed_rx.changed() => return Err(TransportError::Closed),
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "WebSocket text frame received");
                    return Ok(Bytes::from(text.into_bytes()));
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "WebSocket binary frame received");
                    return Ok(Bytes::from(data));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket close received");
                    self.mark_closed();
                    return Err(TransportError::Closed);
                }
                Some(Err(e)) => {
                    let err = TransportError::from(e);
                    if err.is_closed() {
                        self.mark_closed();
                    }
                    return Err(err);
                }
                None => {
                    self.mark_closed();
                    return Err(TransportError::Closed);
                }
            }
        }
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        if !self.is_active() {
            return Err(TransportError::Closed);
        }

        let message = match String::from_utf8(frame.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };

        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            let err = TransportError::from(e);
            if err.is_closed() {
                self.mark_closed();
            }
            err
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.closed_tx.send_replace(true);

        let flush = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, flush).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                let err = TransportError::from(e);
                if err.is_closed() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
            Err(_) => {
                warn!(peer = ?self.peer_addr, "Timed out flushing WebSocket close");
                Ok(())
            }
        }
    }

    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

impl<S> std::fmt::Debug for WsTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("peer_addr", &self.peer_addr)
            .field("active", &!self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================
// WsListener
// ============================================

/// TCP listener that upgrades connections on one HTTP path.
///
/// # Example
/// ```ignore
/// let listener = WsListener::bind("127.0.0.1:0".parse()?, "/ws").await?;
/// let (stream, peer) = listener.accept().await?;
/// let transport = listener.upgrade(stream, peer).await?;
/// ```
pub struct WsListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    path: String,
}

impl WsListener {
    /// Binds the listener.
    ///
    /// # Socket Options
    /// - `SO_REUSEADDR`: Enabled for quick rebinding
    /// - Non-blocking: Required for async operations
    ///
    /// # Errors
    /// - `BindFailed`: If binding fails
    /// - `AddressInUse`: If address is already in use
    pub async fn bind(addr: SocketAddr, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        info!("Binding WebSocket listener to {}{}", addr, path);

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("creating TCP socket", e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;

        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse { addr }
            } else {
                TransportError::bind_failed(addr, e.to_string())
            }
        })?;

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::bind_failed(addr, e.to_string()))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to Tokio listener", e))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        info!("WebSocket listener bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            path,
        })
    }

    /// Accepts the next raw TCP connection.
    ///
    /// # Errors
    /// Returns an I/O error if accepting fails.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::io("accepting TCP connection", e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }
        trace!(%peer, "TCP connection accepted");
        Ok((stream, peer))
    }

    /// Performs the WebSocket upgrade on an accepted stream.
    ///
    /// Requests for any path other than the configured one are answered
    /// with `404 Not Found`.
    ///
    /// # Errors
    /// Returns `Handshake` if the upgrade fails or the path is wrong.
    pub async fn upgrade(&self, stream: TcpStream, peer: SocketAddr) -> Result<WsTransport<TcpStream>> {
        let expected = self.path.clone();
        let check_path = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
            if req.uri().path() == expected {
                Ok(resp)
            } else {
                let mut err = ErrorResponse::new(Some(format!(
                    "no WebSocket endpoint at {}",
                    req.uri().path()
                )));
                *err.status_mut() = StatusCode::NOT_FOUND;
                Err(err)
            }
        };

        let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
            .await
            .map_err(TransportError::handshake)?;

        debug!(%peer, "WebSocket upgrade complete");
        Ok(WsTransport::new(ws, Some(peer)))
    }

    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the upgrade path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for WsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsListener")
            .field("local_addr", &self.local_addr)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ============================================
// Client Dial
// ============================================

/// Transport type produced by [`dial`].
pub type ClientTransport = WsTransport<MaybeTlsStream<TcpStream>>;

/// Connects to a relay at a `ws://` URL.
///
/// # Errors
/// Returns `Io` if the TCP connection fails (see
/// [`TransportError::is_retryable`]) and `Handshake` if the upgrade fails.
pub async fn dial(url: &str) -> Result<ClientTransport> {
    debug!(url, "Dialing relay");
    let (ws, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| match e {
            tokio_tungstenite::tungstenite::Error::Io(source) => TransportError::io("dialing relay", source),
            other => TransportError::handshake(other),
        })?;

    let peer_addr = match ws.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.peer_addr().ok(),
        _ => None,
    };

    info!(url, status = %response.status(), "Connected to relay");
    Ok(WsTransport::new(ws, peer_addr))
}

// ============================================
// Tests
// ============================================
