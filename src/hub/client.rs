//! Hub-protocol client boundary.
//!
//! The hub client maintains the device's own cloud session and is opaque to
//! the bridge. The bridge only needs three things from it: a way to subscribe
//! to stream-open requests, a non-blocking `do_work` step that delivers them,
//! and a final `destroy`.
//!
//! [`ChannelHub`] is an in-memory implementation fed through a [`HubHandle`],
//! used by the demos and tests in place of a real cloud connection.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{StreamOpenRequest, StreamOpenResponse};

use super::transport::HubTransport;

// ============================================================================
// StreamRequestHandler
// ============================================================================

/// Receiver of stream-open requests.
///
/// Must answer synchronously; there is no error channel back to the hub.
pub trait StreamRequestHandler {
    /// Decides on a stream-open request.
    fn on_stream_open_request(&mut self, request: StreamOpenRequest) -> StreamOpenResponse;
}

// ============================================================================
// HubClient
// ============================================================================

/// Device-side hub client driven by the poll loop.
pub trait HubClient {
    /// Returns the transport of the hub session.
    fn transport(&self) -> HubTransport;

    /// Subscribes to stream-open requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hub`] if the subscription cannot be set up.
    fn enable_stream_requests(&mut self) -> Result<()>;

    /// Advances the hub session by one non-blocking step.
    ///
    /// Any stream-open request that arrived is handed to `handler`.
    fn do_work(&mut self, handler: &mut dyn StreamRequestHandler);

    /// Releases the hub session. Idempotent.
    fn destroy(&mut self);
}

// ============================================================================
// HubResponse
// ============================================================================

/// A delivered request and the answer it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubResponse {
    /// Stream name from the request.
    pub name: String,
    /// Hub correlation ID from the request.
    pub request_id: Option<String>,
    /// The bridge's answer.
    pub response: StreamOpenResponse,
}

// ============================================================================
// HubHandle
// ============================================================================

/// Cloud-side handle pushing stream requests into a [`ChannelHub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<StreamOpenRequest>,
}

impl HubHandle {
    /// Queues a stream-open request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hub`] if the hub has been dropped.
    pub fn push(&self, request: StreamOpenRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::hub("hub client is gone"))
    }

    /// Queues a stream-open request given as JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is not a valid request
    /// - [`Error::Hub`] if the hub has been dropped
    pub fn push_json(&self, json: &str) -> Result<()> {
        self.push(StreamOpenRequest::from_json(json)?)
    }
}

// ============================================================================
// ChannelHub
// ============================================================================

/// In-memory hub client fed by [`HubHandle`]s.
///
/// Requests pushed before [`HubClient::enable_stream_requests`] stay queued
/// until the subscription exists.
#[derive(Debug)]
pub struct ChannelHub {
    transport: HubTransport,
    tx: mpsc::UnboundedSender<StreamOpenRequest>,
    rx: mpsc::UnboundedReceiver<StreamOpenRequest>,
    enabled: bool,
    destroyed: bool,
    ticks: u64,
    responses: Vec<HubResponse>,
}

impl ChannelHub {
    /// Creates a hub for the given transport.
    #[must_use]
    pub fn new(transport: HubTransport) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            transport,
            tx,
            rx,
            enabled: false,
            destroyed: false,
            ticks: 0,
            responses: Vec::new(),
        }
    }

    /// Returns a handle for pushing requests.
    #[must_use]
    pub fn handle(&self) -> HubHandle {
        HubHandle {
            tx: self.tx.clone(),
        }
    }

    /// Returns every answer given so far, in delivery order.
    #[inline]
    #[must_use]
    pub fn responses(&self) -> &[HubResponse] {
        &self.responses
    }

    /// Returns the number of `do_work` calls.
    #[inline]
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns `true` once destroyed.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(HubTransport::default())
    }
}

impl HubClient for ChannelHub {
    fn transport(&self) -> HubTransport {
        self.transport
    }

    fn enable_stream_requests(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(Error::hub("cannot subscribe on a destroyed hub client"));
        }
        self.enabled = true;
        debug!(transport = %self.transport, "Stream requests enabled");
        Ok(())
    }

    fn do_work(&mut self, handler: &mut dyn StreamRequestHandler) {
        if self.destroyed {
            warn!("do_work called on a destroyed hub client");
            return;
        }

        self.ticks += 1;

        if !self.enabled {
            return;
        }

        while let Ok(request) = self.rx.try_recv() {
            info!(name = %request.name, request_id = ?request.request_id, "Received stream request");

            let name = request.name.clone();
            let request_id = request.request_id.clone();
            let response = handler.on_stream_open_request(request);

            self.responses.push(HubResponse {
                name,
                request_id,
                response,
            });
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.enabled = false;
        self.rx.close();
        debug!(ticks = self.ticks, "Hub client destroyed");
    }
}

// ============================================================================
// Tests
// ============================================================================
