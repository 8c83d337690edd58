//! Relay policies and the session handler that runs them.
//!
//! A [`RelayPolicy`] decides what happens to each inbound frame. The default
//! [`EchoRelay`] sends it straight back; [`FnRelay`] hands it to an
//! application closure instead.
//!
//! [`BridgeHandler`] is the [`SessionHandler`] the bridge installs on every
//! session. It logs each callback, runs the relay policy and, when the run
//! is configured to finish after one relay, stops the [`RunToken`] on the
//! first send completion.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{SendId, StreamId};
use crate::protocol::{FrameRef, StreamOpenRequest};
use crate::scheduler::{RunToken, StopReason};
use crate::transport::session::CLOSE_NORMAL;
use crate::transport::{OpenInfo, SessionContext, SessionHandler};

// ============================================================================
// Constants
// ============================================================================

/// Close code used after a failed relay send.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

// ============================================================================
// RelayPolicy
// ============================================================================

/// Per-frame relay decision.
pub trait RelayPolicy {
    /// Handles one inbound frame.
    ///
    /// The frame borrows the session buffer and is only valid for this call.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::send_frame`] or the application returns.
    /// Errors are logged; they do not end the session.
    fn on_frame(&mut self, ctx: &mut SessionContext<'_>, frame: FrameRef<'_>) -> Result<()>;
}

/// Boxed relay policy owned by one session.
pub type BoxedRelay = Box<dyn RelayPolicy + Send>;

// ============================================================================
// EchoRelay
// ============================================================================

/// Sends every frame back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoRelay;

impl RelayPolicy for EchoRelay {
    fn on_frame(&mut self, ctx: &mut SessionContext<'_>, frame: FrameRef<'_>) -> Result<()> {
        ctx.send_frame(frame.kind(), frame.payload(), true)?;
        Ok(())
    }
}

// ============================================================================
// FnRelay
// ============================================================================

/// Relay policy backed by a closure.
///
/// # Example
///
/// ```ignore
/// let upper = FnRelay::new(|ctx, frame| {
///     let reply = frame.text_lossy().to_uppercase();
///     ctx.send_frame(FrameType::Text, reply.as_bytes(), true)?;
///     Ok(())
/// });
/// ```
pub struct FnRelay<F> {
    f: F,
}

impl<F> FnRelay<F>
where
    F: FnMut(&mut SessionContext<'_>, FrameRef<'_>) -> Result<()>,
{
    /// Wraps a closure.
    #[inline]
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnRelay<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRelay").finish_non_exhaustive()
    }
}

impl<F> RelayPolicy for FnRelay<F>
where
    F: FnMut(&mut SessionContext<'_>, FrameRef<'_>) -> Result<()>,
{
    fn on_frame(&mut self, ctx: &mut SessionContext<'_>, frame: FrameRef<'_>) -> Result<()> {
        (self.f)(ctx, frame)
    }
}

// ============================================================================
// BridgeHandler
// ============================================================================

/// Session handler installed by the bridge.
pub struct BridgeHandler {
    name: String,
    request_id: Option<String>,
    relay: BoxedRelay,
    run: RunToken,
    close_after_relay: bool,
    relay_done: bool,
    frames_received: u64,
    frames_sent: u64,
}

impl BridgeHandler {
    /// Creates a handler for one accepted request.
    #[must_use]
    pub fn new(
        request: &StreamOpenRequest,
        relay: BoxedRelay,
        run: RunToken,
        close_after_relay: bool,
    ) -> Self {
        Self {
            name: request.name.clone(),
            request_id: request.request_id.clone(),
            relay,
            run,
            close_after_relay,
            relay_done: false,
            frames_received: 0,
            frames_sent: 0,
        }
    }

    /// Returns the stream name from the request.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hub correlation ID from the request.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the number of frames delivered to the relay.
    #[inline]
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Returns the number of sends that completed successfully.
    #[inline]
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Returns `true` if a relay send completion will finish the run.
    #[inline]
    #[must_use]
    pub fn completes_run(&self) -> bool {
        self.close_after_relay && !self.relay_done
    }

    /// Detaches the handler from the run once its session is replaced.
    ///
    /// Late send completions on the retiring session no longer stop the run.
    pub fn retire(&mut self) {
        self.close_after_relay = false;
    }

    /// Finishes the run after the first relay round-trip.
    fn finish_relay(&mut self, ctx: &mut SessionContext<'_>, reason: StopReason, code: u16) {
        if !self.close_after_relay || self.relay_done {
            return;
        }
        self.relay_done = true;
        self.run.stop(reason);
        ctx.close(code, "relay complete");
    }
}

impl fmt::Debug for BridgeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandler")
            .field("name", &self.name)
            .field("request_id", &self.request_id)
            .field("close_after_relay", &self.close_after_relay)
            .field("frames_received", &self.frames_received)
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

impl SessionHandler for BridgeHandler {
    fn on_open(&mut self, ctx: &mut SessionContext<'_>, open: &OpenInfo) {
        info!(
            stream_id = %ctx.stream_id(),
            name = %self.name,
            status = open.status,
            protocol = ?open.protocol,
            "Client connected to the streaming gateway"
        );
    }

    fn on_frame(&mut self, ctx: &mut SessionContext<'_>, frame: FrameRef<'_>) {
        self.frames_received += 1;

        if let Err(e) = self.relay.on_frame(ctx, frame) {
            warn!(stream_id = %ctx.stream_id(), error = %e, "Relay policy failed");
        }
    }

    fn on_send_complete(&mut self, ctx: &mut SessionContext<'_>, send_id: SendId, result: &Result<()>) {
        match result {
            Ok(()) => {
                self.frames_sent += 1;
                info!(stream_id = %ctx.stream_id(), %send_id, "Sent stream data");
                self.finish_relay(ctx, StopReason::Completed, CLOSE_NORMAL);
            }
            Err(e) => {
                error!(stream_id = %ctx.stream_id(), %send_id, error = %e, "Failed sending stream data");
                let reason = StopReason::Failed {
                    message: e.to_string(),
                };
                self.finish_relay(ctx, reason, CLOSE_INTERNAL_ERROR);
            }
        }
    }

    fn on_peer_closed(&mut self, ctx: &mut SessionContext<'_>, code: u16, reason: &str) {
        info!(stream_id = %ctx.stream_id(), name = %self.name, code, reason, "Stream closed by the gateway");
    }

    fn on_error(&mut self, ctx: &mut SessionContext<'_>, error: &Error) {
        error!(
            stream_id = %ctx.stream_id(),
            name = %self.name,
            timeout = error.is_timeout(),
            connection = error.is_connection_error(),
            error = %error,
            "Stream error"
        );
    }
}

/// Formats a stream label for log lines.
pub(crate) fn describe(stream_id: StreamId, handler: &BridgeHandler) -> String {
    match handler.request_id() {
        Some(request_id) => format!("{} ({stream_id}, request {request_id})", handler.name()),
        None => format!("{} ({stream_id})", handler.name()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    use crate::protocol::{FrameType, UrlDescriptor};
    use crate::transport::connection::{ConnectionCommand, ConnectionEvent};
    use crate::transport::{SessionOptions, SessionState, Termination, WebSocketSession};

    fn request() -> StreamOpenRequest {
        StreamOpenRequest::new("test", "ws://127.0.0.1:9/s", "tok1").with_request_id("r-1")
    }

    #[test]
    fn test_handler_carries_request_identity() {
        let handler = BridgeHandler::new(&request(), Box::new(EchoRelay), RunToken::new(), true);
        assert_eq!(handler.name(), "test");
        assert_eq!(handler.request_id(), Some("r-1"));
        assert_eq!(handler.frames_received(), 0);
        assert_eq!(handler.frames_sent(), 0);
    }

    #[test]
    fn test_debug_hides_token() {
        let handler = BridgeHandler::new(&request(), Box::new(EchoRelay), RunToken::new(), true);
        let debug = format!("{handler:?}");
        assert!(!debug.contains("tok1"));
        assert!(debug.contains("test"));
    }

    #[test]
    fn test_describe_includes_request_id() {
        let handler = BridgeHandler::new(&request(), Box::new(EchoRelay), RunToken::new(), true);
        let id = StreamId::generate();
        let text = describe(id, &handler);
        assert!(text.starts_with("test ("));
        assert!(text.contains("request r-1"));
    }

    #[test]
    fn test_fn_relay_debug() {
        let relay = FnRelay::new(|_ctx: &mut SessionContext<'_>, _frame: FrameRef<'_>| Ok(()));
        assert_eq!(format!("{relay:?}"), "FnRelay { .. }");
    }

    type Attached = (
        WebSocketSession<BridgeHandler>,
        UnboundedSender<ConnectionEvent>,
        UnboundedReceiver<ConnectionCommand>,
    );

    /// Opens an echo session on an in-memory link and relays one frame.
    fn relaying(run: &RunToken) -> (Attached, SendId) {
        let handler = BridgeHandler::new(&request(), Box::new(EchoRelay), run.clone(), true);
        let descriptor = UrlDescriptor::parse("ws://127.0.0.1:9/s").unwrap();
        let mut session = WebSocketSession::new(
            StreamId::generate(),
            descriptor,
            "tok1",
            "MQTT",
            SessionOptions::default(),
            handler,
        )
        .unwrap();

        let (events, mut commands) = session.attach_in_memory();
        events
            .send(ConnectionEvent::Opened {
                status: 101,
                protocol: None,
            })
            .unwrap();
        events
            .send(ConnectionEvent::Frame {
                kind: FrameType::Text,
                payload: b"hi".to_vec(),
            })
            .unwrap();
        session.do_work();

        let Ok(ConnectionCommand::Send { id, payload, .. }) = commands.try_recv() else {
            panic!("echo was not handed to the socket task");
        };
        assert_eq!(payload, b"hi");
        ((session, events, commands), id)
    }

    #[tokio::test]
    async fn test_failed_relay_send_is_recorded_as_failure() {
        let run = RunToken::new();
        let ((mut session, events, _commands), id) = relaying(&run);

        events
            .send(ConnectionEvent::SendComplete {
                id,
                result: Err(Error::frame_transport("broken pipe")),
            })
            .unwrap();
        events
            .send(ConnectionEvent::Failed(Error::frame_transport("send failed, connection unusable")))
            .unwrap();
        session.do_work();

        assert!(session.is_terminated());
        assert!(matches!(
            session.termination(),
            Some(Termination::Failed(Error::FrameTransport { .. }))
        ));
        assert!(matches!(run.reason(), Some(StopReason::Failed { .. })));
        assert_eq!(session.handler().frames_received(), 1);
        assert_eq!(session.handler().frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_successful_relay_send_closes_gracefully() {
        let run = RunToken::new();
        let ((mut session, events, mut commands), id) = relaying(&run);

        events
            .send(ConnectionEvent::SendComplete { id, result: Ok(()) })
            .unwrap();
        session.do_work();

        assert_eq!(session.state(), SessionState::Closing);
        assert!(matches!(
            commands.try_recv(),
            Ok(ConnectionCommand::Close { code: 1000, .. })
        ));
        assert_eq!(run.reason(), Some(StopReason::Completed));
        assert!(!session.handler().completes_run());
    }

    #[tokio::test]
    async fn test_retired_handler_leaves_run_alone() {
        let run = RunToken::new();
        let ((mut session, events, _commands), id) = relaying(&run);

        session.handler_mut().retire();
        assert!(!session.handler().completes_run());
        session.close();

        events
            .send(ConnectionEvent::SendComplete { id, result: Ok(()) })
            .unwrap();
        session.do_work();

        assert!(run.is_running());
        assert_eq!(session.handler().frames_sent(), 1);
    }
}
