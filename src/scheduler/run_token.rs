//! Run token shared by the poll loop and the stream callbacks.
//!
//! A [`RunToken`] starts out running. Any clone may stop it, once; the first
//! [`StopReason`] sticks and the token never runs again.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

// ============================================================================
// StopReason
// ============================================================================

/// Why the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The relay round-trip finished.
    Completed,
    /// The gateway closed the stream before the relay finished.
    PeerClosed {
        /// WebSocket close code.
        code: u16,
    },
    /// The stream session failed.
    Failed {
        /// Error description.
        message: String,
    },
    /// The hub client could not subscribe to stream requests.
    HubFailed {
        /// Error description.
        message: String,
    },
    /// Stopped from outside (signal, caller).
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::PeerClosed { code } => write!(f, "peer closed (code {code})"),
            Self::Failed { message } => write!(f, "failed: {message}"),
            Self::HubFailed { message } => write!(f, "hub failed: {message}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

// ============================================================================
// RunToken
// ============================================================================

#[derive(Debug, Default)]
struct RunTokenInner {
    stopped: AtomicBool,
    reason: Mutex<Option<StopReason>>,
}

/// Cloneable, monotonic stop signal.
#[derive(Debug, Clone, Default)]
pub struct RunToken {
    inner: Arc<RunTokenInner>,
}

impl RunToken {
    /// Creates a running token.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` until the token is stopped.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stops the token.
    ///
    /// Returns `true` if this call stopped it, `false` if it was already
    /// stopped (the earlier reason is kept).
    pub fn stop(&self, reason: StopReason) -> bool {
        let mut slot = self.inner.reason.lock();
        if slot.is_some() {
            return false;
        }
        debug!(%reason, "Run stopped");
        *slot = Some(reason);
        self.inner.stopped.store(true, Ordering::Release);
        true
    }

    /// Stops the token as [`StopReason::Cancelled`].
    #[inline]
    pub fn cancel(&self) -> bool {
        self.stop(StopReason::Cancelled)
    }

    /// Returns the stop reason, if stopped.
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        self.inner.reason.lock().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
