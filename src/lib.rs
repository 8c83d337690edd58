//! Device Stream Bridge - on-demand WebSocket tunnels for connected devices.
//!
//! A device keeps a long-lived session with its cloud hub. Now and then the
//! hub asks the device to open a stream: a bidirectional WebSocket tunnel to
//! a streaming gateway, authorized with a short-lived bearer token. This
//! library accepts those requests, opens the tunnel and relays frames
//! through an application policy (echo by default).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  stream request   ┌──────────────┐   WebSocket   ┌───────────┐
//! │ Hub client │──────────────────►│ StreamBridge │◄─────────────►│ Streaming │
//! │            │◄──────────────────│  (sessions)  │               │ gateway   │
//! └────────────┘   accept/reject   └──────────────┘               └───────────┘
//!        ▲                                 ▲
//!        └──────────── PollLoop ───────────┘
//!                (hub first, then streams, every tick)
//! ```
//!
//! Key design principles:
//!
//! - Every callback fires from a non-blocking tick; socket I/O lives in a
//!   background task per session
//! - Stopping is explicit: a [`RunToken`] replaces any process-wide flag
//! - Frame buffers are bounds-checked; oversized frames are errors, never
//!   truncated
//! - The hub boundary only ever sees accept or reject
//!
//! # Quick Start
//!
//! ```no_run
//! use device_stream_bridge::{
//!     BridgeOptions, ChannelHub, HubTransport, PollLoop, Result, RunToken, StreamBridge,
//!     StreamOpenRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let hub = ChannelHub::new(HubTransport::Mqtt);
//!     hub.handle().push(StreamOpenRequest::new(
//!         "test",
//!         "wss://gw.example.com:443/streams/abc",
//!         "tok1",
//!     ))?;
//!
//!     let bridge = StreamBridge::new(BridgeOptions::new(), RunToken::new())?;
//!     let outcome = PollLoop::new(hub, bridge).run().await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | [`StreamBridge`], relay and admission policies, options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hub`] | Hub client boundary and the in-memory [`ChannelHub`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Stream requests, gateway URLs, frames |
//! | [`scheduler`] | [`RunToken`] and the [`PollLoop`] |
//! | [`transport`] | WebSocket session state machine |
//!
//! # Features
//!
//! - `tls` - `wss://` gateways through `native-tls`

// ============================================================================
// Modules
// ============================================================================

/// Stream bridge controller and policies.
///
/// - [`StreamBridge`] - Hub-facing request handler owning the sessions
/// - [`BridgeOptions`] - Configuration
/// - [`RelayPolicy`] - Per-frame relay hook
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Hub client boundary.
pub mod hub;

/// Type-safe identifiers for streams and sends.
pub mod identifiers;

/// Stream requests, gateway URLs and frames.
pub mod protocol;

/// Run control and the cooperative poll loop.
pub mod scheduler;

/// WebSocket transport layer.
///
/// Handles the upgrade handshake, the socket task and the session state machine.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Admission, AdmissionPolicy, BridgeHandler, BridgeOptions, EchoRelay, FnRelay, RejectWhenBusy,
    RelayPolicy, ReplaceActive, StreamBridge, StreamOutcome, StreamSummary,
};

// Error types
pub use error::{Error, Result};

// Hub types
pub use hub::{ChannelHub, HubClient, HubHandle, HubResponse, HubTransport, StreamRequestHandler};

// Identifier types
pub use identifiers::{SendId, StreamId};

// Protocol types
pub use protocol::{
    FrameBuffer, FrameRef, FrameType, GatewayScheme, StreamOpenRequest, StreamOpenResponse,
    UrlDescriptor,
};

// Scheduler types
pub use scheduler::{PollLoop, RunOutcome, RunToken, StopReason};

// Transport types
pub use transport::{
    OpenInfo, SessionContext, SessionHandler, SessionOptions, SessionState, Termination,
    WebSocketSession,
};
