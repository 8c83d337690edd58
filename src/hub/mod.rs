//! Hub-protocol client boundary.
//!
//! The hub client is an external collaborator: it keeps its own cloud
//! session alive and, now and then, delivers a stream-open request. This
//! module defines the narrow interface the bridge relies on.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | `HubClient` trait and the in-memory `ChannelHub` |
//! | `transport` | Hub transport selector |

// ============================================================================
// Submodules
// ============================================================================

/// Hub client trait and in-memory implementation.
pub mod client;

/// Hub transport selector.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ChannelHub, HubClient, HubHandle, HubResponse, StreamRequestHandler};
pub use transport::HubTransport;
