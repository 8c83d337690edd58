//! Stream protocol data types.
//!
//! This module defines the values that flow through the bridge, from the
//! hub notification down to the relayed frames.
//!
//! # Data Flow
//!
//! | Type | Produced by | Consumed by |
//! |------|-------------|-------------|
//! | `StreamOpenRequest` | Hub client | Bridge controller |
//! | `StreamOpenResponse` | Bridge controller | Hub client |
//! | `UrlDescriptor` | Bridge controller | WebSocket session |
//! | `FrameRef` | WebSocket session | Relay policy |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame types and bounded frame buffer |
//! | `stream` | Stream-open request/response |
//! | `url` | Gateway URL decomposition |

// ============================================================================
// Submodules
// ============================================================================

/// Frame types and bounded frame buffer.
pub mod frame;

/// Stream-open request and response.
pub mod stream;

/// Gateway URL decomposition.
pub mod url;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{DEFAULT_FRAME_CAPACITY, FrameBuffer, FrameRef, FrameType};
pub use stream::{StreamOpenRequest, StreamOpenResponse};
pub use self::url::{GatewayScheme, UrlDescriptor};
