//! WebSocket transport layer.
//!
//! This module owns the connection to the streaming gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   commands    ┌──────────────────┐            ┌─────────────┐
//! │  WebSocketSession    │──────────────►│  socket task     │  WebSocket │  Streaming  │
//! │  (ticked, never      │               │  (tokio, owns    │◄──────────►│  gateway    │
//! │   blocks)            │◄──────────────│   the stream)    │            │             │
//! └──────────────────────┘    events     └──────────────────┘            └─────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `WebSocketSession::new` - Build the upgrade request (bearer token, sub-protocol)
//! 2. `WebSocketSession::open` - Spawn the socket task, enter `Connecting`
//! 3. `WebSocketSession::do_work` - Each tick: deadlines, events, callbacks
//! 4. `WebSocketSession::teardown` - Release the connection, enter `Closed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Socket task and its channels |
//! | `handshake` | Upgrade request construction |
//! | `session` | Session state machine and handler callbacks |

// ============================================================================
// Submodules
// ============================================================================

/// Socket task and its channels.
pub(crate) mod connection;

/// Upgrade request construction.
pub mod handshake;

/// Session state machine.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use session::{
    OpenInfo, SessionContext, SessionHandler, SessionOptions, SessionState, Termination,
    WebSocketSession,
};
