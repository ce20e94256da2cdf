//! JSON-framed websocket transport.
//!
//! A [`Socket`] owns one physical connection. A background task drives the
//! websocket; the handle only exchanges commands and parsed frames with it.
//!
//! Guarantees:
//! - [`Socket::send`] never fails because of connection state; frames sent
//!   while the socket is not open are dropped.
//! - The fate settles exactly once. Only [`Socket::close`] (or dropping the
//!   handle) settles it successfully; transport errors, server-initiated
//!   closes and malformed frames settle it with an error.
//! - No frame is delivered after `close` is called or after a frame failed
//!   to parse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace, warn};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away; used when a session discards a socket.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Received a frame that violates the framing policy.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code reported when the peer vanished without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when the close frame carried no status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Transport-level failures.
///
/// `Clone` so that every waiter on a socket's fate observes the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    /// Opening handshake did not complete in time.
    #[error("connection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Opening handshake failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Server closed the connection, or it dropped without a close frame.
    #[error("the websocket connection was aborted by the server ({code} {reason})")]
    Closed {
        /// Close status code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// An inbound frame was not valid JSON.
    #[error("invalid JSON was received: {0}")]
    InvalidJson(String),

    /// Read or write failed on an open connection.
    #[error("websocket error: {0}")]
    Transport(String),
}

type Fate = Option<Result<(), SocketError>>;

enum Command {
    Send(String),
    Close(u16),
}

/// State shared between the handle and its driver task.
#[derive(Debug)]
struct Shared {
    open: AtomicBool,
    fate: watch::Sender<Fate>,
}

impl Shared {
    /// Settle the fate unless it already settled. Either way the socket is
    /// no longer open afterwards.
    fn settle(&self, result: Result<(), SocketError>) {
        self.open.store(false, Ordering::SeqCst);
        self.fate.send_if_modified(|fate| {
            if fate.is_some() {
                return false;
            }
            *fate = Some(result);
            true
        });
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One physical gateway connection.
#[derive(Debug)]
pub struct Socket {
    commands: mpsc::UnboundedSender<Command>,
    inbound: mpsc::UnboundedReceiver<Value>,
    shared: Arc<Shared>,
    closed_locally: AtomicBool,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(text) => write!(f, "Send({} bytes)", text.len()),
            Self::Close(code) => write!(f, "Close({code})"),
        }
    }
}

impl Socket {
    /// Open a connection to `url`.
    ///
    /// The whole opening handshake (TCP, TLS, upgrade) must finish within
    /// `timeout`. A zero timeout waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Timeout`] or [`SocketError::Connect`].
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, SocketError> {
        let handshake = tokio_tungstenite::connect_async(url);
        let result = if timeout.is_zero() {
            handshake.await
        } else {
            tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| SocketError::Timeout(timeout))?
        };

        let (stream, _) = result.map_err(|e| SocketError::Connect(e.to_string()))?;
        debug!(url, "websocket connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established websocket.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (fate, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            fate,
        });

        tokio::spawn(drive(stream, commands_rx, inbound_tx, Arc::clone(&shared)));

        Self {
            commands: commands_tx,
            inbound: inbound_rx,
            shared,
            closed_locally: AtomicBool::new(false),
        }
    }

    /// Whether frames written now would reach the wire.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Serialize `message` as JSON and write it if the socket is open.
    ///
    /// Never fails; frames are silently dropped once the socket is closing
    /// or closed.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        if !self.is_open() {
            trace!("socket not open, dropping outbound frame");
            return;
        }
        match serde_json::to_string(message) {
            Ok(text) => {
                let _ = self.commands.send(Command::Send(text));
            }
            Err(e) => warn!(error = %e, "failed to serialize outbound frame"),
        }
    }

    /// Next inbound frame, parsed as JSON.
    ///
    /// Returns `None` once the fate has settled and all frames received
    /// before that have been consumed, or immediately after `close`.
    pub async fn recv(&mut self) -> Option<Value> {
        if self.closed_locally.load(Ordering::SeqCst) {
            return None;
        }
        self.inbound.recv().await
    }

    /// Close gracefully with `code`. Settles the fate successfully unless it
    /// already settled.
    pub fn close(&self, code: u16) {
        self.closed_locally.store(true, Ordering::SeqCst);
        self.shared.settle(Ok(()));
        let _ = self.commands.send(Command::Close(code));
    }

    /// Wait for the socket's lifecycle to end.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection, unless it was ended by
    /// [`Socket::close`].
    pub async fn fate(&self) -> Result<(), SocketError> {
        let mut fate = self.shared.fate.subscribe();
        match fate.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone().unwrap_or(Ok(())),
            Err(_) => Ok(()),
        }
    }
}

async fn drive<S>(
    mut stream: WebSocketStream<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: mpsc::UnboundedSender<Value>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = stream.send(Message::Text(text.into())).await {
                        warn!(error = %e, "websocket write failed");
                        shared.settle(Err(SocketError::Transport(e.to_string())));
                        break;
                    }
                }
                Some(Command::Close(code)) => {
                    close_with(&mut stream, code).await;
                    break;
                }
                None => {
                    // handle dropped
                    shared.settle(Ok(()));
                    close_with(&mut stream, CLOSE_NORMAL).await;
                    break;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !deliver(&shared, &inbound, text.as_bytes()) {
                        close_with(&mut stream, CLOSE_POLICY_VIOLATION).await;
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !deliver(&shared, &inbound, &bytes) {
                        close_with(&mut stream, CLOSE_POLICY_VIOLATION).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or_else(
                        || (CLOSE_NO_STATUS, String::new()),
                        |frame| (u16::from(frame.code), frame.reason.to_string()),
                    );
                    debug!(code, %reason, "server closed websocket");
                    shared.settle(Err(SocketError::Closed { code, reason }));
                    let _ = stream.close(None).await;
                    break;
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    shared.settle(Err(SocketError::Transport(e.to_string())));
                    break;
                }
                None => {
                    shared.settle(Err(SocketError::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection dropped".to_string(),
                    }));
                    break;
                }
            },
        }
    }
}

/// Parse one inbound payload and hand it to the reader.
///
/// Returns `false` when the payload was malformed; the fate has then been
/// settled and the connection must be torn down.
fn deliver(shared: &Shared, inbound: &mpsc::UnboundedSender<Value>, payload: &[u8]) -> bool {
    if !shared.is_open() {
        return true;
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(value) => {
            let _ = inbound.send(value);
            true
        }
        Err(e) => {
            warn!(error = %e, "received malformed frame");
            shared.settle(Err(SocketError::InvalidJson(e.to_string())));
            false
        }
    }
}

async fn close_with<S>(stream: &mut WebSocketStream<S>, code: u16)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    };
    if let Err(e) = stream.close(Some(frame)).await {
        trace!(error = %e, code, "close handshake failed");
    }
}
