//! Gateway socket task and its channels.
//!
//! The socket itself lives in a tokio task. The session talks to it only
//! through two unbounded channels, so the session side never awaits:
//!
//! - commands (send, close) flow into the task
//! - events (opened, frame, send completion, close, failure) flow out and
//!   are drained by the session on its next tick
//!
//! # Event Loop
//!
//! The task handles:
//!
//! - The upgrade handshake, retried once without the sub-protocol label
//!   when the gateway does not echo it
//! - Incoming data and close frames from the gateway, bounded by the
//!   frame capacity before tungstenite buffers them
//! - Outgoing frames from the session, completed in order
//! - Graceful close with a bounded wait for the peer's reply

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SendId;
use crate::protocol::FrameType;

use super::handshake;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the peer's close reply.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code used when no peer code was supplied.
const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// Close code sent when an inbound frame exceeds the capacity.
pub(crate) const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

/// Largest control frame payload (RFC 6455, 5.5).
const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// Types
// ============================================================================

type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type GatewaySink = SplitSink<GatewayStream, Message>;
type GatewaySource = SplitStream<GatewayStream>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Commands from the session to the socket task.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Send one complete data frame.
    Send {
        id: SendId,
        kind: FrameType,
        payload: Vec<u8>,
    },
    /// Start a graceful close.
    Close { code: u16, reason: String },
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Events from the socket task to the session.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    /// Upgrade completed.
    Opened {
        /// HTTP status of the upgrade response.
        status: u16,
        /// Sub-protocol selected by the gateway.
        protocol: Option<String>,
    },
    /// Data frame received.
    Frame { kind: FrameType, payload: Vec<u8> },
    /// A send finished, successfully or not.
    SendComplete { id: SendId, result: Result<()> },
    /// Gateway closed the connection.
    PeerClosed { code: u16, reason: String },
    /// Handshake or transport fault. Terminal.
    Failed(Error),
    /// Local close finished. Terminal.
    Closed,
}

// ============================================================================
// ConnectionLink
// ============================================================================

/// Session-side handle to a running socket task.
pub(crate) struct ConnectionLink {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    task: JoinHandle<()>,
}

impl ConnectionLink {
    /// Spawns the socket task for an upgrade request.
    ///
    /// Inbound data messages larger than `frame_capacity` fail the
    /// connection with [`Error::BufferOverflow`].
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(request: Request, frame_capacity: usize) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_connection(request, frame_capacity, command_rx, event_tx));

        Self {
            command_tx,
            event_rx,
            task,
        }
    }

    /// Queues a command for the socket task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTransport`] if the task has already exited.
    pub(crate) fn command(&self, command: ConnectionCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::frame_transport("connection task has exited"))
    }

    /// Returns the next ready event without waiting.
    ///
    /// A task that exited without a terminal event is reported as a failure.
    pub(crate) fn try_next(&mut self) -> Option<ConnectionEvent> {
        match self.event_rx.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(ConnectionEvent::Failed(
                Error::frame_transport("connection task ended unexpectedly"),
            )),
        }
    }

    /// Asks the task to close and detaches from it.
    ///
    /// Returns the task handle so the caller can wait for the close to finish.
    pub(crate) fn release(self, code: u16, reason: &str) -> JoinHandle<()> {
        let _ = self.command_tx.send(ConnectionCommand::Close {
            code,
            reason: reason.to_string(),
        });
        self.task
    }

    /// Stops the task immediately, dropping the socket without a close frame.
    ///
    /// Used when the handshake never finished.
    pub(crate) fn abort(self) {
        self.task.abort();
    }

    /// Builds a link backed by channels only, with no socket behind it.
    #[cfg(test)]
    pub(crate) fn in_memory() -> (
        Self,
        mpsc::UnboundedSender<ConnectionEvent>,
        mpsc::UnboundedReceiver<ConnectionCommand>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let link = Self {
            command_tx,
            event_rx,
            task: tokio::spawn(async {}),
        };
        (link, event_tx, command_rx)
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Socket limits for a frame capacity.
///
/// Control frames keep their protocol maximum so a small capacity never
/// rejects a close or ping.
pub(crate) fn socket_config(frame_capacity: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(frame_capacity))
        .max_frame_size(Some(frame_capacity.max(MAX_CONTROL_PAYLOAD)))
}

/// Performs the upgrade, dropping the sub-protocol label if the gateway
/// ignored it.
async fn connect(request: Request, config: WebSocketConfig) -> Result<(GatewayStream, Response)> {
    let fallback = handshake::without_sub_protocol(&request);

    match connect_async_with_config(request, Some(config), false).await {
        Ok(pair) => Ok(pair),
        Err(e) if handshake::is_unechoed_sub_protocol(&e) => {
            let Some(fallback) = fallback else {
                return Err(Error::handshake(e.to_string()));
            };
            debug!("Gateway did not echo the sub-protocol, reconnecting without it");
            connect_async_with_config(fallback, Some(config), false)
                .await
                .map_err(|e| Error::handshake(e.to_string()))
        }
        Err(e) => Err(Error::handshake(e.to_string())),
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Connects, then pumps frames until close or failure.
async fn run_connection(
    request: Request,
    frame_capacity: usize,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let target = request.uri().to_string();
    debug!(%target, "Connecting to streaming gateway");

    let (ws_stream, response) = match connect(request, socket_config(frame_capacity)).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(%target, error = %e, "Gateway handshake failed");
            let _ = event_tx.send(ConnectionEvent::Failed(e));
            return;
        }
    };

    let protocol = response
        .headers()
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let _ = event_tx.send(ConnectionEvent::Opened {
        status: response.status().as_u16(),
        protocol,
    });

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let _ = event_tx.send(ConnectionEvent::Frame {
                            kind: FrameType::Text,
                            payload: text.as_bytes().to_vec(),
                        });
                    }

                    Some(Ok(Message::Binary(data))) => {
                        let _ = event_tx.send(ConnectionEvent::Frame {
                            kind: FrameType::Binary,
                            payload: data.to_vec(),
                        });
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                            None => (CLOSE_CODE_NO_STATUS, String::new()),
                        };
                        debug!(code, "WebSocket closed by gateway");
                        // tungstenite queues the close reply; flush it out
                        let _ = ws_write.flush().await;
                        let _ = event_tx.send(ConnectionEvent::PeerClosed { code, reason });
                        return;
                    }

                    Some(Err(WsError::Capacity(CapacityError::MessageTooLong { size, .. }))) => {
                        warn!(size, capacity = frame_capacity, "Inbound frame exceeds buffer capacity");
                        close_gracefully(&mut ws_write, &mut ws_read, CLOSE_MESSAGE_TOO_BIG, String::new()).await;
                        let _ = event_tx.send(ConnectionEvent::Failed(
                            Error::buffer_overflow(size, frame_capacity),
                        ));
                        return;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "Gateway socket error");
                        let _ = event_tx.send(ConnectionEvent::Failed(Error::from(e)));
                        return;
                    }

                    None => {
                        let _ = event_tx.send(ConnectionEvent::Failed(
                            Error::frame_transport("connection reset by gateway"),
                        ));
                        return;
                    }

                    // Ping/Pong are answered by tungstenite
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { id, kind, payload }) => {
                        let message = match to_message(kind, payload) {
                            Ok(message) => message,
                            Err(e) => {
                                let _ = event_tx.send(ConnectionEvent::SendComplete { id, result: Err(e) });
                                continue;
                            }
                        };

                        if let Err(e) = ws_write.send(message).await {
                            warn!(%id, error = %e, "Frame send failed");
                            let _ = event_tx.send(ConnectionEvent::SendComplete {
                                id,
                                result: Err(Error::frame_transport(e.to_string())),
                            });
                            let _ = event_tx.send(ConnectionEvent::Failed(
                                Error::frame_transport("send failed, connection unusable"),
                            ));
                            return;
                        }

                        trace!(%id, "Frame sent");
                        let _ = event_tx.send(ConnectionEvent::SendComplete { id, result: Ok(()) });
                    }

                    Some(ConnectionCommand::Close { code, reason }) => {
                        close_gracefully(&mut ws_write, &mut ws_read, code, reason).await;
                        let _ = event_tx.send(ConnectionEvent::Closed);
                        return;
                    }

                    None => {
                        debug!("Session dropped its link, closing");
                        close_gracefully(&mut ws_write, &mut ws_read, 1001, String::new()).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Converts a relay frame into a tungstenite message.
fn to_message(kind: FrameType, payload: Vec<u8>) -> Result<Message> {
    match kind {
        FrameType::Text => {
            let text = String::from_utf8(payload)
                .map_err(|_| Error::invalid_argument("text frame payload is not UTF-8"))?;
            Ok(Message::Text(text.into()))
        }
        FrameType::Binary => Ok(Message::Binary(payload.into())),
    }
}

/// Sends a close frame and waits, bounded, for the peer's reply.
async fn close_gracefully(
    ws_write: &mut GatewaySink,
    ws_read: &mut GatewaySource,
    code: u16,
    reason: String,
) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Close frame not sent");
        return;
    }

    let drain = async {
        while let Some(message) = ws_read.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    };

    if timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        debug!("Gateway did not answer close in time");
    }
}

// ============================================================================
// Tests
// ============================================================================
