//! Stream bridge controller.
//!
//! [`StreamBridge`] answers stream-open requests from the hub client. For an
//! accepted request it parses the gateway URL, opens a
//! [`WebSocketSession`] and keeps it in a keyed collection that the poll
//! loop ticks. Finished sessions are reaped into a per-stream history.
//!
//! Nothing crosses the hub boundary except the accept flag: parse or
//! construction failures become a rejection, never an error.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::hub::StreamRequestHandler;
use crate::identifiers::StreamId;
use crate::protocol::{StreamOpenRequest, StreamOpenResponse, UrlDescriptor};
use crate::scheduler::{RunToken, StopReason};
use crate::transport::{Termination, WebSocketSession};

use super::admission::{Admission, AdmissionPolicy, BoxedAdmission, RejectWhenBusy};
use super::options::BridgeOptions;
use super::relay::{self, BoxedRelay, BridgeHandler, EchoRelay, RelayPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on waiting for socket tasks after teardown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Builds the relay policy for each accepted request.
pub type RelayFactory = Box<dyn Fn(&StreamOpenRequest) -> BoxedRelay + Send>;

type BridgeSession = WebSocketSession<BridgeHandler>;

// ============================================================================
// StreamOutcome
// ============================================================================

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Closed from this side after the relay finished.
    Completed,
    /// The gateway closed the stream.
    PeerClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The session failed.
    Failed(String),
    /// Torn down while still live.
    Cancelled,
}

impl From<Termination> for StreamOutcome {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Completed => Self::Completed,
            Termination::PeerClosed { code, reason } => Self::PeerClosed { code, reason },
            Termination::Failed(e) => Self::Failed(e.to_string()),
            Termination::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::PeerClosed { code, .. } => write!(f, "peer closed ({code})"),
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

// ============================================================================
// StreamSummary
// ============================================================================

/// Record of one finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Stream ID assigned on accept.
    pub stream_id: StreamId,
    /// Stream name from the request.
    pub name: String,
    /// Hub correlation ID from the request.
    pub request_id: Option<String>,
    /// Gateway as `host:port/path`.
    pub gateway: String,
    /// How the stream ended.
    pub outcome: StreamOutcome,
    /// Frames handed to the relay.
    pub frames_received: u64,
    /// Sends that completed successfully.
    pub frames_sent: u64,
}

// ============================================================================
// StreamBridge
// ============================================================================

/// Accepts stream requests and owns the resulting sessions.
pub struct StreamBridge {
    options: BridgeOptions,
    run: RunToken,
    admission: BoxedAdmission,
    relay_factory: RelayFactory,
    sessions: FxHashMap<StreamId, BridgeSession>,
    /// Active stream IDs, oldest first.
    order: Vec<StreamId>,
    /// Replaced sessions finishing their close handshake.
    retiring: Vec<BridgeSession>,
    history: Vec<StreamSummary>,
    closing_tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for StreamBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBridge")
            .field("options", &self.options)
            .field("active", &self.order)
            .field("retiring", &self.retiring.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StreamBridge - Construction
// ============================================================================

impl StreamBridge {
    /// Creates a bridge with the echo relay and the reject-when-busy policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the options are invalid.
    pub fn new(options: BridgeOptions, run: RunToken) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            options,
            run,
            admission: Box::new(RejectWhenBusy),
            relay_factory: Box::new(|_: &StreamOpenRequest| -> BoxedRelay { Box::new(EchoRelay) }),
            sessions: FxHashMap::default(),
            order: Vec::new(),
            retiring: Vec::new(),
            history: Vec::new(),
            closing_tasks: Vec::new(),
        })
    }

    /// Replaces the admission policy.
    #[must_use]
    pub fn with_admission(mut self, policy: impl AdmissionPolicy + Send + 'static) -> Self {
        self.admission = Box::new(policy);
        self
    }

    /// Replaces the relay policy, built fresh for every accepted request.
    #[must_use]
    pub fn with_relay<F, R>(mut self, factory: F) -> Self
    where
        F: Fn(&StreamOpenRequest) -> R + Send + 'static,
        R: RelayPolicy + Send + 'static,
    {
        self.relay_factory =
            Box::new(move |request: &StreamOpenRequest| -> BoxedRelay { Box::new(factory(request)) });
        self
    }
}

// ============================================================================
// StreamBridge - Public API
// ============================================================================

impl StreamBridge {
    /// Advances every session by one tick and reaps the finished ones.
    pub fn do_work(&mut self) {
        for session in self.sessions.values_mut() {
            session.do_work();
        }
        for session in &mut self.retiring {
            session.do_work();
        }
        self.reap();
    }

    /// Closes every session and records them in the history.
    ///
    /// Idempotent. Socket tasks keep finishing their close handshake in the
    /// background; await [`StreamBridge::drain`] to wait for them.
    pub fn teardown(&mut self) {
        for stream_id in std::mem::take(&mut self.order) {
            if let Some(session) = self.sessions.remove(&stream_id) {
                self.retire_finished(session);
            }
        }
        for session in std::mem::take(&mut self.retiring) {
            self.retire_finished(session);
        }
    }

    /// Waits for background close handshakes, up to `timeout`.
    ///
    /// Tasks still running at the deadline are aborted.
    pub async fn drain(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;

        for mut task in self.closing_tasks.drain(..) {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("Socket task did not finish closing in time");
                task.abort();
            }
        }
    }

    /// Returns the number of active sessions.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.order.len()
    }

    /// Returns the active stream IDs, oldest first.
    #[inline]
    #[must_use]
    pub fn active_streams(&self) -> &[StreamId] {
        &self.order
    }

    /// Returns an active session.
    #[inline]
    #[must_use]
    pub fn session(&self, stream_id: StreamId) -> Option<&WebSocketSession<BridgeHandler>> {
        self.sessions.get(&stream_id)
    }

    /// Returns one summary per finished stream, in finishing order.
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[StreamSummary] {
        &self.history
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Returns the run token shared with the poll loop.
    #[inline]
    #[must_use]
    pub fn run_token(&self) -> &RunToken {
        &self.run
    }
}

// ============================================================================
// StreamBridge - Internals
// ============================================================================

impl StreamBridge {
    /// Parses, builds and opens a session for an admitted request.
    ///
    /// `replace` is retired only once the new session has been built.
    fn open_session(&mut self, request: &StreamOpenRequest, replace: Option<StreamId>) -> Result<StreamId> {
        let descriptor = UrlDescriptor::parse(&request.url)?;

        let stream_id = StreamId::generate();
        let handler = BridgeHandler::new(
            request,
            (self.relay_factory)(request),
            self.run.clone(),
            self.options.close_after_relay,
        );
        let mut session = WebSocketSession::new(
            stream_id,
            descriptor,
            &request.authorization_token,
            self.options.sub_protocol(),
            self.options.session_options(),
            handler,
        )?;

        if let Some(old) = replace {
            self.retire(old);
        }

        session.open()?;
        self.sessions.insert(stream_id, session);
        self.order.push(stream_id);
        Ok(stream_id)
    }

    /// Moves an active session to the retiring list and starts its close.
    fn retire(&mut self, stream_id: StreamId) {
        self.order.retain(|id| *id != stream_id);

        if let Some(mut session) = self.sessions.remove(&stream_id) {
            info!(stream = %relay::describe(stream_id, session.handler()), "Replacing active stream");
            session.handler_mut().retire();
            session.close();
            self.retiring.push(session);
        }
    }

    /// Removes finished sessions and applies the stream-end policy.
    fn reap(&mut self) {
        let finished: Vec<StreamId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.sessions.get(id).is_some_and(|s| s.is_terminated()))
            .collect();

        for stream_id in finished {
            self.order.retain(|id| *id != stream_id);
            let Some(session) = self.sessions.remove(&stream_id) else {
                continue;
            };
            let outcome = self.retire_finished(session);

            if self.options.exit_on_stream_end {
                let reason = match outcome {
                    StreamOutcome::Completed => Some(StopReason::Completed),
                    StreamOutcome::PeerClosed { code, .. } => Some(StopReason::PeerClosed { code }),
                    StreamOutcome::Failed(message) => Some(StopReason::Failed { message }),
                    StreamOutcome::Cancelled => None,
                };
                if let Some(reason) = reason {
                    self.run.stop(reason);
                }
            }
        }

        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retiring)
            .into_iter()
            .partition(|s| s.is_terminated());
        self.retiring = live;
        for session in done {
            self.retire_finished(session);
        }
    }

    /// Tears a session down and records its summary. Returns the outcome.
    fn retire_finished(&mut self, mut session: BridgeSession) -> StreamOutcome {
        let was = session.state();
        if let Some(task) = session.teardown() {
            self.closing_tasks.push(task);
        }

        let outcome = session
            .take_termination()
            .map_or(StreamOutcome::Cancelled, StreamOutcome::from);

        let stream_id = session.stream_id();
        let handler = session.handler();
        info!(
            stream = %relay::describe(stream_id, handler),
            state = %was,
            %outcome,
            "Stream finished"
        );

        self.history.push(StreamSummary {
            stream_id,
            name: handler.name().to_string(),
            request_id: handler.request_id().map(str::to_string),
            gateway: session.descriptor().authority_path(),
            outcome: outcome.clone(),
            frames_received: handler.frames_received(),
            frames_sent: handler.frames_sent(),
        });
        outcome
    }
}

// ============================================================================
// StreamBridge - StreamRequestHandler
// ============================================================================

impl StreamRequestHandler for StreamBridge {
    fn on_stream_open_request(&mut self, request: StreamOpenRequest) -> StreamOpenResponse {
        if !self.run.is_running() {
            debug!(name = %request.name, "Run is stopping, rejecting stream request");
            return StreamOpenResponse::reject();
        }

        let replace = match self.admission.admit(&request, &self.order, self.options.max_sessions) {
            Admission::Accept => None,
            Admission::Replace(stream_id) => Some(stream_id),
            Admission::Reject(reason) => {
                info!(name = %request.name, request_id = ?request.request_id, %reason, "Stream request refused");
                return StreamOpenResponse::reject();
            }
        };

        match self.open_session(&request, replace) {
            Ok(stream_id) => {
                info!(
                    %stream_id,
                    name = %request.name,
                    request_id = ?request.request_id,
                    "Stream request accepted"
                );
                StreamOpenResponse::accept()
            }
            Err(e) => {
                warn!(
                    name = %request.name,
                    request_id = ?request.request_id,
                    error = %e,
                    "Stream request rejected"
                );
                StreamOpenResponse::reject()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
