//! Admission policies for concurrent stream requests.
//!
//! The bridge holds at most `max_sessions` active sessions. When a request
//! arrives and the collection is full, an [`AdmissionPolicy`] decides
//! whether the newcomer is turned away or displaces an active stream.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::StreamId;
use crate::protocol::StreamOpenRequest;

// ============================================================================
// Admission
// ============================================================================

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Open a new session alongside the active ones.
    Accept,
    /// Close the given session, then open the new one.
    Replace(StreamId),
    /// Turn the request away.
    Reject(String),
}

// ============================================================================
// AdmissionPolicy
// ============================================================================

/// Decides whether a stream request may open a session.
pub trait AdmissionPolicy {
    /// Checks a request against the active sessions.
    ///
    /// `active` lists the active streams, oldest first.
    fn admit(&mut self, request: &StreamOpenRequest, active: &[StreamId], max_sessions: usize) -> Admission;
}

/// Boxed admission policy owned by the bridge.
pub type BoxedAdmission = Box<dyn AdmissionPolicy + Send>;

// ============================================================================
// RejectWhenBusy
// ============================================================================

/// Rejects requests while the session collection is full.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectWhenBusy;

impl AdmissionPolicy for RejectWhenBusy {
    fn admit(&mut self, _request: &StreamOpenRequest, active: &[StreamId], max_sessions: usize) -> Admission {
        if active.len() < max_sessions {
            Admission::Accept
        } else {
            Admission::Reject(format!("{} of {max_sessions} sessions active", active.len()))
        }
    }
}

// ============================================================================
// ReplaceActive
// ============================================================================

/// Closes the oldest active session to make room.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceActive;

impl AdmissionPolicy for ReplaceActive {
    fn admit(&mut self, _request: &StreamOpenRequest, active: &[StreamId], max_sessions: usize) -> Admission {
        match active.first() {
            Some(&oldest) if active.len() >= max_sessions => Admission::Replace(oldest),
            _ => Admission::Accept,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
