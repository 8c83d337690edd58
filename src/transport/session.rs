//! WebSocket session state machine.
//!
//! A [`WebSocketSession`] owns one gateway connection for one stream request.
//! It never blocks: every transition happens inside [`WebSocketSession::do_work`],
//! which drains whatever the socket task has reported since the last tick and
//! dispatches it to a [`SessionHandler`].
//!
//! # States
//!
//! ```text
//! Created ──open()──► Connecting ──handshake ok──► Open ──close()──► Closing
//!                         │                          │                  │
//!                         └─ handshake error ──┐     ├─ peer close ─┐   │
//!                                              ▼     ▼              ▼   ▼
//!                                              └──────────────► Closed ◄┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let descriptor = UrlDescriptor::parse(&request.url)?;
//! let mut session = WebSocketSession::new(
//!     StreamId::generate(),
//!     descriptor,
//!     &request.authorization_token,
//!     "MQTT",
//!     SessionOptions::default(),
//!     MyHandler::default(),
//! )?;
//! session.open()?;
//!
//! while !session.is_terminated() {
//!     session.do_work();
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{SendId, StreamId};
use crate::protocol::{DEFAULT_FRAME_CAPACITY, FrameBuffer, FrameRef, FrameType, UrlDescriptor};

use super::connection::{CLOSE_MESSAGE_TOO_BIG, ConnectionCommand, ConnectionEvent, ConnectionLink};
use super::handshake;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for the upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for one frame send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on socket events dispatched in one tick.
const MAX_EVENTS_PER_TICK: usize = 64;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Unexpected condition on this side.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a [`WebSocketSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Built, no connection attempt yet.
    Created,
    /// Upgrade handshake in flight.
    Connecting,
    /// Frames can flow.
    Open,
    /// Local close sent, waiting for the gateway.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` for [`SessionState::Closed`].
    #[inline]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// OpenInfo
// ============================================================================

/// Result of a successful upgrade handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInfo {
    /// HTTP status of the upgrade response (101).
    pub status: u16,
    /// Sub-protocol echoed by the gateway, if any.
    pub protocol: Option<String>,
}

// ============================================================================
// Termination
// ============================================================================

/// Why a session reached [`SessionState::Closed`].
#[derive(Debug)]
pub enum Termination {
    /// Closed from this side after the work was done.
    Completed,
    /// Gateway closed first.
    PeerClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Handshake, transport, deadline or overflow failure.
    Failed(Error),
    /// Torn down while still live.
    Cancelled,
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Per-session limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Frame buffer capacity, applied to inbound and outbound frames.
    pub frame_capacity: usize,
    /// Deadline for the `Connecting` state.
    pub handshake_timeout: Duration,
    /// Deadline for each send completion.
    pub send_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

// ============================================================================
// SessionHandler
// ============================================================================

/// Callbacks fired by [`WebSocketSession::do_work`].
///
/// All callbacks run on the thread driving the tick. Each one gets a
/// [`SessionContext`] through which it can queue sends or ask for a close;
/// those take effect right after the callback returns.
pub trait SessionHandler {
    /// Handshake completed, the session is `Open`.
    fn on_open(&mut self, _ctx: &mut SessionContext<'_>, _info: &OpenInfo) {}

    /// A data frame arrived and fit the frame buffer.
    fn on_frame(&mut self, ctx: &mut SessionContext<'_>, frame: FrameRef<'_>);

    /// A previously queued send finished.
    ///
    /// A fatal error in `result` ends the session once this returns.
    fn on_send_complete(
        &mut self,
        _ctx: &mut SessionContext<'_>,
        _send_id: SendId,
        _result: &Result<()>,
    ) {
    }

    /// The gateway closed the connection. The session is `Closed`.
    fn on_peer_closed(&mut self, _ctx: &mut SessionContext<'_>, _code: u16, _reason: &str) {}

    /// A fatal error ended the session. The session is `Closed`.
    fn on_error(&mut self, _ctx: &mut SessionContext<'_>, _error: &Error) {}
}

// ============================================================================
// Outbox
// ============================================================================

/// A validated frame waiting to be handed to the socket task.
#[derive(Debug)]
struct QueuedFrame {
    id: SendId,
    kind: FrameType,
    payload: Vec<u8>,
}

/// Work queued by callbacks or the public API, flushed after each dispatch.
#[derive(Debug)]
struct Outbox {
    next_id: SendId,
    frames: Vec<QueuedFrame>,
    close: Option<(u16, String)>,
}

impl Outbox {
    fn new() -> Self {
        Self {
            next_id: SendId::new(1),
            frames: Vec::new(),
            close: None,
        }
    }
}

// ============================================================================
// SessionContext
// ============================================================================

/// Handle given to [`SessionHandler`] callbacks.
pub struct SessionContext<'a> {
    stream_id: StreamId,
    state: SessionState,
    capacity: usize,
    outbox: &'a mut Outbox,
}

impl<'a> SessionContext<'a> {
    fn new(stream_id: StreamId, state: SessionState, capacity: usize, outbox: &'a mut Outbox) -> Self {
        Self {
            stream_id,
            state,
            capacity,
            outbox,
        }
    }

    /// Returns the stream this session serves.
    #[inline]
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Returns the session state at dispatch time.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Queues a frame for the gateway.
    ///
    /// Completion is reported later through
    /// [`SessionHandler::on_send_complete`] with the returned ID.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is `Open` and not closing
    /// - [`Error::BufferOverflow`] if the payload exceeds the frame capacity
    /// - [`Error::InvalidArgument`] for non-final frames or non-UTF-8 text
    pub fn send_frame(&mut self, kind: FrameType, payload: &[u8], is_final: bool) -> Result<SendId> {
        if self.state != SessionState::Open || self.outbox.close.is_some() {
            return Err(Error::invalid_state("send frame", self.state));
        }
        validate_frame(self.capacity, kind, payload, is_final)?;

        let id = self.outbox.next_id;
        self.outbox.next_id = id.next();
        self.outbox.frames.push(QueuedFrame {
            id,
            kind,
            payload: payload.to_vec(),
        });
        Ok(id)
    }

    /// Asks for a graceful close once queued frames are handed off.
    pub fn close(&mut self, code: u16, reason: impl Into<String>) {
        if self.outbox.close.is_none() {
            self.outbox.close = Some((code, reason.into()));
        }
    }
}

/// Checks an outbound frame against the session limits.
fn validate_frame(capacity: usize, kind: FrameType, payload: &[u8], is_final: bool) -> Result<()> {
    if !is_final {
        return Err(Error::invalid_argument(
            "fragmented sends are not supported, frames must be final",
        ));
    }
    if payload.len() > capacity {
        return Err(Error::buffer_overflow(payload.len(), capacity));
    }
    if kind == FrameType::Text && std::str::from_utf8(payload).is_err() {
        return Err(Error::invalid_argument("text frame payload is not UTF-8"));
    }
    Ok(())
}

// ============================================================================
// WebSocketSession
// ============================================================================

/// One gateway connection serving one stream request.
///
/// Owned exclusively by its creator. Dropping an unfinished session sends a
/// close to the gateway in the background.
pub struct WebSocketSession<H> {
    stream_id: StreamId,
    descriptor: UrlDescriptor,
    request: Option<Request>,
    state: SessionState,
    handler: H,
    buffer: FrameBuffer,
    options: SessionOptions,
    link: Option<ConnectionLink>,
    outbox: Outbox,
    connect_deadline: Option<Instant>,
    pending_sends: VecDeque<(SendId, Instant)>,
    termination: Option<Termination>,
    closing_task: Option<JoinHandle<()>>,
}

// ============================================================================
// WebSocketSession - Debug
// ============================================================================

impl<H> fmt::Debug for WebSocketSession<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("stream_id", &self.stream_id)
            .field("gateway", &self.descriptor.authority_path())
            .field("state", &self.state)
            .field("pending_sends", &self.pending_sends.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebSocketSession - Public API
// ============================================================================

impl<H: SessionHandler> WebSocketSession<H> {
    /// Creates a session in the `Created` state.
    ///
    /// Builds the upgrade request, including the bearer `Authorization`
    /// header, but does not touch the network.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the token or sub-protocol cannot be sent as a header
    /// - [`Error::Config`] if the frame capacity is zero
    pub fn new(
        stream_id: StreamId,
        descriptor: UrlDescriptor,
        auth_token: &str,
        sub_protocol: &str,
        options: SessionOptions,
        handler: H,
    ) -> Result<Self> {
        if options.frame_capacity == 0 {
            return Err(Error::config("frame capacity must be greater than zero"));
        }

        let request = handshake::build_request(&descriptor, auth_token, sub_protocol)?;

        Ok(Self {
            stream_id,
            descriptor,
            request: Some(request),
            state: SessionState::Created,
            handler,
            buffer: FrameBuffer::new(options.frame_capacity),
            options,
            link: None,
            outbox: Outbox::new(),
            connect_deadline: None,
            pending_sends: VecDeque::new(),
            termination: None,
            closing_task: None,
        })
    }

    /// Starts the upgrade handshake.
    ///
    /// Moves to `Connecting`. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the session is `Created`.
    pub fn open(&mut self) -> Result<()> {
        let request = match (self.state, self.request.take()) {
            (SessionState::Created, Some(request)) => request,
            (state, request) => {
                self.request = request;
                return Err(Error::invalid_state("open", state));
            }
        };

        info!(
            stream_id = %self.stream_id,
            host = %self.descriptor.host(),
            port = self.descriptor.port(),
            path = %self.descriptor.path(),
            "Connecting to streaming gateway"
        );

        self.link = Some(ConnectionLink::spawn(request, self.options.frame_capacity));
        self.connect_deadline = Some(Instant::now() + self.options.handshake_timeout);
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// Advances the session by one tick.
    ///
    /// Never waits. Checks deadlines, then dispatches the socket events that
    /// are ready, then hands queued frames to the socket task.
    pub fn do_work(&mut self) {
        if matches!(self.state, SessionState::Created | SessionState::Closed) {
            return;
        }

        self.expire_deadlines();

        for _ in 0..MAX_EVENTS_PER_TICK {
            if self.state.is_closed() {
                break;
            }
            let Some(event) = self.link.as_mut().and_then(ConnectionLink::try_next) else {
                break;
            };
            self.dispatch(event);
            self.flush_outbox();
        }
    }

    /// Sends a frame to the gateway.
    ///
    /// The frame is handed to the socket task right away; completion is
    /// reported on a later tick through [`SessionHandler::on_send_complete`].
    ///
    /// # Errors
    ///
    /// - [`Error::PeerClosed`] once the gateway has closed the stream
    /// - otherwise the same as [`SessionContext::send_frame`]
    pub fn send_frame(&mut self, kind: FrameType, payload: &[u8], is_final: bool) -> Result<SendId> {
        if let Some(Termination::PeerClosed { code, reason }) = &self.termination {
            return Err(Error::peer_closed(*code, reason.clone()));
        }

        let id = SessionContext::new(
            self.stream_id,
            self.state,
            self.options.frame_capacity,
            &mut self.outbox,
        )
        .send_frame(kind, payload, is_final)?;
        self.flush_outbox();
        Ok(id)
    }

    /// Starts a graceful close.
    ///
    /// The session moves to `Closing` and reaches `Closed` once the gateway
    /// answers. A session still `Connecting` is dropped immediately.
    pub fn close(&mut self) {
        self.begin_close(CLOSE_NORMAL, String::new());
    }

    /// Releases the connection and moves to `Closed`.
    ///
    /// Idempotent. The first call returns the socket task handle, which
    /// finishes the close handshake in the background; later calls return
    /// `None`.
    pub fn teardown(&mut self) -> Option<JoinHandle<()>> {
        if !self.state.is_closed() {
            let termination = match self.state {
                SessionState::Closing => Termination::Completed,
                _ => Termination::Cancelled,
            };

            if let Some(link) = self.link.take() {
                match self.state {
                    SessionState::Connecting => link.abort(),
                    _ => self.closing_task = Some(link.release(CLOSE_GOING_AWAY, "")),
                }
            }

            self.state = SessionState::Closed;
            self.termination.get_or_insert(termination);
            debug!(stream_id = %self.stream_id, "Session torn down");
        }

        self.request = None;
        self.buffer.clear();
        self.pending_sends.clear();
        self.closing_task.take()
    }

    /// Returns the stream ID.
    #[inline]
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the session is `Closed`.
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.is_closed()
    }

    /// Returns the gateway descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &UrlDescriptor {
        &self.descriptor
    }

    /// Returns the number of sends awaiting completion.
    #[inline]
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.pending_sends.len()
    }

    /// Returns the handler.
    #[inline]
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the handler mutably.
    #[inline]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Returns why the session closed, if it has.
    #[inline]
    #[must_use]
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Takes the termination cause out of the session.
    #[inline]
    pub fn take_termination(&mut self) -> Option<Termination> {
        self.termination.take()
    }
}

// ============================================================================
// WebSocketSession - Internals
// ============================================================================

impl<H: SessionHandler> WebSocketSession<H> {
    /// Dispatches one socket event to the handler.
    fn dispatch(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { status, protocol } => {
                if self.state != SessionState::Connecting {
                    return;
                }
                self.state = SessionState::Open;
                self.connect_deadline = None;

                info!(stream_id = %self.stream_id, status, ?protocol, "Connected to the streaming gateway");

                let info = OpenInfo { status, protocol };
                let mut ctx = SessionContext::new(
                    self.stream_id,
                    self.state,
                    self.options.frame_capacity,
                    &mut self.outbox,
                );
                self.handler.on_open(&mut ctx, &info);
            }

            ConnectionEvent::Frame { kind, payload } => {
                if self.state != SessionState::Open {
                    debug!(stream_id = %self.stream_id, state = %self.state, "Dropping frame outside Open");
                    return;
                }

                if let Err(e) = self.buffer.fill(&payload) {
                    warn!(stream_id = %self.stream_id, error = %e, "Inbound frame rejected");
                    self.fail(e, CLOSE_MESSAGE_TOO_BIG);
                    return;
                }

                let frame = FrameRef::new(kind, self.buffer.as_slice());
                info!(
                    stream_id = %self.stream_id,
                    %kind,
                    len = frame.len(),
                    data = %frame.text_lossy(),
                    "Received stream data"
                );

                let mut ctx = SessionContext::new(
                    self.stream_id,
                    self.state,
                    self.options.frame_capacity,
                    &mut self.outbox,
                );
                self.handler.on_frame(&mut ctx, frame);
            }

            ConnectionEvent::SendComplete { id, result } => {
                if let Some(pos) = self.pending_sends.iter().position(|(pending, _)| *pending == id) {
                    self.pending_sends.remove(pos);
                }

                let mut ctx = SessionContext::new(
                    self.stream_id,
                    self.state,
                    self.options.frame_capacity,
                    &mut self.outbox,
                );
                self.handler.on_send_complete(&mut ctx, id, &result);

                // A failed send leaves the socket unusable
                if let Err(e) = result
                    && e.is_fatal()
                {
                    self.fail(e, CLOSE_INTERNAL_ERROR);
                }
            }

            ConnectionEvent::PeerClosed { code, reason } => {
                let was_closing = self.state == SessionState::Closing;
                self.finish();

                if was_closing {
                    self.termination.get_or_insert(Termination::Completed);
                    return;
                }

                info!(stream_id = %self.stream_id, code, %reason, "Streaming gateway closed the stream");

                let mut ctx = SessionContext::new(
                    self.stream_id,
                    self.state,
                    self.options.frame_capacity,
                    &mut self.outbox,
                );
                self.handler.on_peer_closed(&mut ctx, code, &reason);
                self.termination
                    .get_or_insert(Termination::PeerClosed { code, reason });
            }

            ConnectionEvent::Failed(error) => {
                if self.state == SessionState::Closing {
                    debug!(stream_id = %self.stream_id, error = %error, "Transport error while closing");
                }
                self.finish();
                self.report_error(error);
            }

            ConnectionEvent::Closed => {
                self.finish();
                self.termination.get_or_insert(Termination::Completed);
                debug!(stream_id = %self.stream_id, "Session closed");
            }
        }
    }

    /// Hands queued frames and close requests to the socket task.
    fn flush_outbox(&mut self) {
        let frames = std::mem::take(&mut self.outbox.frames);

        for frame in frames {
            let Some(link) = self.link.as_ref() else {
                break;
            };

            let command = ConnectionCommand::Send {
                id: frame.id,
                kind: frame.kind,
                payload: frame.payload,
            };

            if let Err(e) = link.command(command) {
                self.fail(e, CLOSE_INTERNAL_ERROR);
                return;
            }

            self.pending_sends
                .push_back((frame.id, Instant::now() + self.options.send_timeout));
        }

        if let Some((code, reason)) = self.outbox.close.take() {
            self.begin_close(code, reason);
        }
    }

    /// Moves to `Closing` (or straight to `Closed` before the handshake).
    fn begin_close(&mut self, code: u16, reason: String) {
        match self.state {
            SessionState::Open => {
                let sent = self
                    .link
                    .as_ref()
                    .is_some_and(|link| link.command(ConnectionCommand::Close { code, reason }).is_ok());
                if sent {
                    debug!(stream_id = %self.stream_id, code, "Closing session");
                } else {
                    // The task already exited; its last event decides the outcome
                    debug!(stream_id = %self.stream_id, "Socket task gone, waiting for its final event");
                }
                self.state = SessionState::Closing;
            }
            SessionState::Connecting => {
                if let Some(link) = self.link.take() {
                    link.abort();
                }
                self.finish();
                self.termination.get_or_insert(Termination::Cancelled);
            }
            SessionState::Created => {
                self.finish();
                self.termination.get_or_insert(Termination::Cancelled);
            }
            SessionState::Closing | SessionState::Closed => {}
        }
    }

    /// Fails on expired handshake or send deadlines.
    fn expire_deadlines(&mut self) {
        let now = Instant::now();

        if self.state == SessionState::Connecting
            && self.connect_deadline.is_some_and(|deadline| now >= deadline)
        {
            let timeout_ms = self.options.handshake_timeout.as_millis() as u64;
            if let Some(link) = self.link.take() {
                link.abort();
            }
            self.finish();
            self.report_error(Error::handshake_timeout(timeout_ms));
            return;
        }

        if self.state == SessionState::Open
            && let Some(&(id, deadline)) = self.pending_sends.front()
            && now >= deadline
        {
            let timeout_ms = self.options.send_timeout.as_millis() as u64;
            self.fail(Error::send_timeout(id, timeout_ms), CLOSE_INTERNAL_ERROR);
        }
    }

    /// Ends the session on a locally detected fatal error.
    fn fail(&mut self, error: Error, close_code: u16) {
        if let Some(link) = self.link.take() {
            self.closing_task = Some(link.release(close_code, ""));
        }
        self.finish();
        self.report_error(error);
    }

    /// Reports a fatal error to the handler and records it.
    fn report_error(&mut self, error: Error) {
        warn!(stream_id = %self.stream_id, error = %error, "Stream session error");

        let mut ctx = SessionContext::new(
            self.stream_id,
            self.state,
            self.options.frame_capacity,
            &mut self.outbox,
        );
        self.handler.on_error(&mut ctx, &error);
        self.termination.get_or_insert(Termination::Failed(error));
    }

    /// Moves to `Closed` and drops anything left queued.
    fn finish(&mut self) {
        self.state = SessionState::Closed;
        self.link = None;
        self.connect_deadline = None;
        self.pending_sends.clear();
        self.outbox.frames.clear();
        self.outbox.close = None;
    }
}

#[cfg(test)]
impl<H: SessionHandler> WebSocketSession<H> {
    /// Puts the session in `Connecting` on an in-memory link.
    ///
    /// Returns the event sender standing in for the socket task and the
    /// receiver for the commands the session issues.
    pub(crate) fn attach_in_memory(
        &mut self,
    ) -> (
        tokio::sync::mpsc::UnboundedSender<ConnectionEvent>,
        tokio::sync::mpsc::UnboundedReceiver<ConnectionCommand>,
    ) {
        let (link, events, commands) = ConnectionLink::in_memory();
        self.request = None;
        self.link = Some(link);
        self.connect_deadline = Some(Instant::now() + self.options.handshake_timeout);
        self.state = SessionState::Connecting;
        (events, commands)
    }
}

impl<H> Drop for WebSocketSession<H> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            // Detached: the task finishes the close on its own
            let _ = link.release(CLOSE_GOING_AWAY, "");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
