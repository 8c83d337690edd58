//! Stream bridge: request handling, relay and admission.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `admission` | Policies for requests arriving while sessions are active |
//! | `controller` | `StreamBridge`, the hub-facing request handler |
//! | `options` | `BridgeOptions` configuration |
//! | `relay` | Relay policies and the bridge's session handler |

// ============================================================================
// Submodules
// ============================================================================

/// Admission policies.
pub mod admission;

/// Stream bridge controller.
pub mod controller;

/// Bridge configuration.
pub mod options;

/// Relay policies.
pub mod relay;

// ============================================================================
// Re-exports
// ============================================================================

pub use admission::{Admission, AdmissionPolicy, RejectWhenBusy, ReplaceActive};
pub use controller::{DEFAULT_DRAIN_TIMEOUT, StreamBridge, StreamOutcome, StreamSummary};
pub use options::BridgeOptions;
pub use relay::{BridgeHandler, EchoRelay, FnRelay, RelayPolicy};
