//! Run control and the cooperative poll loop.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `poll_loop` | `PollLoop` and `RunOutcome` exit codes |
//! | `run_token` | `RunToken` stop signal and `StopReason` |

// ============================================================================
// Submodules
// ============================================================================

/// Poll loop.
pub mod poll_loop;

/// Run token.
pub mod run_token;

// ============================================================================
// Re-exports
// ============================================================================

pub use poll_loop::{PollLoop, RunOutcome};
pub use run_token::{RunToken, StopReason};
