//! Error types for the stream bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use device_stream_bridge::{Result, UrlDescriptor};
//!
//! fn gateway_host(url: &str) -> Result<String> {
//!     let descriptor = UrlDescriptor::parse(url)?;
//!     Ok(descriptor.host().to_string())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Setup | [`Error::UrlParse`], [`Error::Config`], [`Error::Hub`] |
//! | Handshake | [`Error::Handshake`], [`Error::HandshakeTimeout`] |
//! | Frames | [`Error::FrameTransport`], [`Error::SendTimeout`], [`Error::BufferOverflow`] |
//! | Close | [`Error::PeerClosed`] |
//! | Usage | [`Error::InvalidState`], [`Error::InvalidArgument`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SendId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
/// None of these ever cross the hub-protocol boundary; the bridge turns
/// them into a non-accepting response or a session callback.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Gateway URL could not be decomposed.
    ///
    /// Returned for missing host, bad port, unsupported scheme or an
    /// oversized resource path.
    #[error("Invalid gateway URL '{url}': {message}")]
    UrlParse {
        /// The offending URL.
        url: String,
        /// Description of the problem.
        message: String,
    },

    /// Configuration error.
    ///
    /// Returned when bridge options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Hub client failure outside a stream session.
    #[error("Hub error: {message}")]
    Hub {
        /// Description of the hub failure.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// WebSocket upgrade rejected or connect failure.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Gateway did not complete the upgrade in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Frame Errors
    // ========================================================================
    /// Send or receive fault on an open connection.
    #[error("Frame transport error: {message}")]
    FrameTransport {
        /// Description of the transport fault.
        message: String,
    },

    /// A frame send was not acknowledged in time.
    #[error("Send {send_id} timed out after {timeout_ms}ms")]
    SendTimeout {
        /// The send that expired.
        send_id: SendId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Frame larger than the frame buffer capacity.
    ///
    /// The buffer is left untouched when this is returned.
    #[error("Frame of {len} bytes exceeds buffer capacity of {capacity} bytes")]
    BufferOverflow {
        /// Length of the rejected frame.
        len: usize,
        /// Configured capacity.
        capacity: usize,
    },

    // ========================================================================
    // Close
    // ========================================================================
    /// Gateway closed the connection gracefully.
    ///
    /// Not a failure, but kept apart from [`Error::FrameTransport`].
    #[error("Peer closed the stream (code {code}): {reason}")]
    PeerClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Operation not allowed in the current session state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The session state at the time.
        state: String,
    },

    /// Invalid argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a URL parse error.
    #[inline]
    pub fn url_parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UrlParse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a hub error.
    #[inline]
    pub fn hub(message: impl Into<String>) -> Self {
        Self::Hub {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a frame transport error.
    #[inline]
    pub fn frame_transport(message: impl Into<String>) -> Self {
        Self::FrameTransport {
            message: message.into(),
        }
    }

    /// Creates a send timeout error.
    #[inline]
    pub fn send_timeout(send_id: SendId, timeout_ms: u64) -> Self {
        Self::SendTimeout {
            send_id,
            timeout_ms,
        }
    }

    /// Creates a buffer overflow error.
    #[inline]
    pub fn buffer_overflow(len: usize, capacity: usize) -> Self {
        Self::BufferOverflow { len, capacity }
    }

    /// Creates a peer closed error.
    #[inline]
    pub fn peer_closed(code: u16, reason: impl Into<String>) -> Self {
        Self::PeerClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::SendTimeout { .. }
        )
    }

    /// Returns `true` if the peer closed the stream gracefully.
    #[inline]
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed { .. })
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. }
                | Self::HandshakeTimeout { .. }
                | Self::FrameTransport { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error ends the session it occurred in.
    ///
    /// Usage errors are reported to the caller and leave the session as is.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PeerClosed { .. } | Self::InvalidArgument { .. } | Self::InvalidState { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::handshake("401 Unauthorized");
        assert_eq!(err.to_string(), "Handshake failed: 401 Unauthorized");
    }

    #[test]
    fn test_url_parse_display() {
        let err = Error::url_parse("not a url", "relative URL without a base");
        assert_eq!(
            err.to_string(),
            "Invalid gateway URL 'not a url': relative URL without a base"
        );
    }

    #[test]
    fn test_buffer_overflow_display() {
        let err = Error::buffer_overflow(129, 128);
        assert_eq!(
            err.to_string(),
            "Frame of 129 bytes exceeds buffer capacity of 128 bytes"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::handshake_timeout(5000);
        let send_err = Error::send_timeout(SendId::new(3), 100);
        let other_err = Error::handshake("test");

        assert!(timeout_err.is_timeout());
        assert!(send_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_peer_closed_is_not_transport_error() {
        let closed = Error::peer_closed(1000, "bye");
        let transport = Error::frame_transport("connection reset");

        assert!(closed.is_peer_closed());
        assert!(!closed.is_connection_error());
        assert!(!closed.is_fatal());

        assert!(!transport.is_peer_closed());
        assert!(transport.is_connection_error());
        assert!(transport.is_fatal());
    }

    #[test]
    fn test_overflow_is_fatal() {
        assert!(Error::buffer_overflow(500, 128).is_fatal());
        assert!(!Error::invalid_argument("x").is_fatal());
        assert!(!Error::invalid_state("send", "Closed").is_fatal());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state("send frame", "Connecting");
        assert_eq!(err.to_string(), "Cannot send frame while session is Connecting");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
