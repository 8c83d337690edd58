//! Bridge configuration.
//!
//! Provides a type-safe set of knobs for the bridge, the sessions it opens
//! and the poll loop that drives them.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use device_stream_bridge::{BridgeOptions, HubTransport};
//!
//! let options = BridgeOptions::new()
//!     .with_transport(HubTransport::Amqp)
//!     .with_frame_capacity(4096)
//!     .with_tick_interval(Duration::from_millis(20));
//!
//! options.validate()?;
//! assert_eq!(options.sub_protocol(), "AMQP");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::hub::HubTransport;
use crate::protocol::DEFAULT_FRAME_CAPACITY;
use crate::transport::SessionOptions;
use crate::transport::session::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_SEND_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Default pause between poll ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of concurrently active sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1;

// ============================================================================
// BridgeOptions
// ============================================================================

/// Bridge, session and poll loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Hub transport, source of the default sub-protocol label.
    pub transport: HubTransport,

    /// Explicit `Sec-WebSocket-Protocol` label. Empty string sends none.
    pub sub_protocol: Option<String>,

    /// Frame buffer capacity in bytes.
    pub frame_capacity: usize,

    /// Pause between poll ticks.
    pub tick_interval: Duration,

    /// Deadline for the upgrade handshake.
    pub handshake_timeout: Duration,

    /// Deadline for each frame send.
    pub send_timeout: Duration,

    /// Maximum number of active sessions.
    pub max_sessions: usize,

    /// Finish the run after the first successful relay send.
    pub close_after_relay: bool,

    /// Stop the run when an active stream ends by peer close or error.
    pub exit_on_stream_end: bool,
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transport: HubTransport::Mqtt,
            sub_protocol: None,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            close_after_relay: true,
            exit_on_stream_end: true,
        }
    }

    /// Creates options for a long-running bridge.
    ///
    /// Streams come and go; the run only ends when cancelled.
    #[inline]
    #[must_use]
    pub fn persistent() -> Self {
        Self {
            close_after_relay: false,
            exit_on_stream_end: false,
            ..Self::new()
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Sets the hub transport.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: HubTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Overrides the sub-protocol label.
    #[inline]
    #[must_use]
    pub fn with_sub_protocol(mut self, label: impl Into<String>) -> Self {
        self.sub_protocol = Some(label.into());
        self
    }

    /// Sets the frame buffer capacity.
    #[inline]
    #[must_use]
    pub fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    /// Sets the pause between ticks.
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the per-send deadline.
    #[inline]
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the active session limit.
    #[inline]
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Sets whether the first relay send finishes the run.
    #[inline]
    #[must_use]
    pub fn with_close_after_relay(mut self, enabled: bool) -> Self {
        self.close_after_relay = enabled;
        self
    }

    /// Sets whether the end of a stream stops the run.
    #[inline]
    #[must_use]
    pub fn with_exit_on_stream_end(mut self, enabled: bool) -> Self {
        self.exit_on_stream_end = enabled;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl BridgeOptions {
    /// Returns the sub-protocol label sent in the upgrade request.
    #[inline]
    #[must_use]
    pub fn sub_protocol(&self) -> &str {
        self.sub_protocol
            .as_deref()
            .unwrap_or_else(|| self.transport.sub_protocol())
    }

    /// Returns the per-session limits.
    #[inline]
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            frame_capacity: self.frame_capacity,
            handshake_timeout: self.handshake_timeout,
            send_timeout: self.send_timeout,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero capacity, tick interval, timeouts
    /// or session limit.
    pub fn validate(&self) -> Result<()> {
        if self.frame_capacity == 0 {
            return Err(Error::config("frame capacity must be greater than zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick interval must be greater than zero"));
        }
        if self.handshake_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if self.max_sessions == 0 {
            return Err(Error::config("max sessions must be at least one"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_new_creates_default() {
        let options = BridgeOptions::new();
        assert_eq!(options.transport, HubTransport::Mqtt);
        assert_eq!(options.frame_capacity, 128);
        assert_eq!(options.tick_interval, Duration::from_millis(100));
        assert_eq!(options.max_sessions, 1);
        assert!(options.close_after_relay);
        assert!(options.exit_on_stream_end);
        assert_ok!(options.validate());
    }

    #[test]
    fn test_persistent_constructor() {
        let options = BridgeOptions::persistent();
        assert!(!options.close_after_relay);
        assert!(!options.exit_on_stream_end);
    }

    #[test]
    fn test_builder_chain() {
        let options = BridgeOptions::new()
            .with_transport(HubTransport::Http)
            .with_frame_capacity(4096)
            .with_tick_interval(Duration::from_millis(5))
            .with_max_sessions(2);

        assert_eq!(options.frame_capacity, 4096);
        assert_eq!(options.tick_interval, Duration::from_millis(5));
        assert_eq!(options.max_sessions, 2);
        assert_eq!(options.sub_protocol(), "HTTP");
    }

    #[test]
    fn test_sub_protocol_override() {
        let options = BridgeOptions::new().with_sub_protocol("custom");
        assert_eq!(options.sub_protocol(), "custom");
    }

    #[test]
    fn test_session_options_mirror_fields() {
        let options = BridgeOptions::new()
            .with_frame_capacity(64)
            .with_send_timeout(Duration::from_secs(2));
        let session = options.session_options();
        assert_eq!(session.frame_capacity, 64);
        assert_eq!(session.send_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_validate_zero_capacity() {
        assert_err!(BridgeOptions::new().with_frame_capacity(0).validate());
    }

    #[test]
    fn test_validate_zero_tick() {
        let options = BridgeOptions::new().with_tick_interval(Duration::ZERO);
        assert_err!(options.validate());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let options = BridgeOptions::new().with_handshake_timeout(Duration::ZERO);
        assert_err!(options.validate());
    }

    #[test]
    fn test_validate_zero_sessions() {
        let err = assert_err!(BridgeOptions::new().with_max_sessions(0).validate());
        assert!(err.to_string().contains("max sessions"));
    }
}
