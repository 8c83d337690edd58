//! Stream-open request and response messages.
//!
//! The hub delivers a [`StreamOpenRequest`] when the cloud asks the device
//! to open a tunnel, and expects a [`StreamOpenResponse`] back synchronously.
//!
//! # Format
//!
//! ```json
//! {
//!   "name": "TestStream",
//!   "url": "wss://gateway.example.com:443/bridges/abc",
//!   "authorizationToken": "eyJ...",
//!   "requestId": "12"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// StreamOpenRequest
// ============================================================================

/// Cloud-originated request to open a stream tunnel.
///
/// Consumed once by the bridge. The token is a bearer credential valid only
/// for this request, so `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOpenRequest {
    /// Stream name chosen by the cloud side.
    pub name: String,

    /// Streaming gateway URL.
    pub url: String,

    /// Short-lived bearer token for the gateway.
    pub authorization_token: String,

    /// Hub correlation ID, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl StreamOpenRequest {
    /// Creates a request without a hub correlation ID.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        authorization_token: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            authorization_token: authorization_token.into(),
            request_id: None,
        }
    }

    /// Sets the hub correlation ID.
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Parses a request from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the JSON is malformed
    /// or misses a required field.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Debug for StreamOpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOpenRequest")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("authorization_token", &"<redacted>")
            .field("request_id", &self.request_id)
            .finish()
    }
}

// ============================================================================
// StreamOpenResponse
// ============================================================================

/// Answer returned to the hub for a [`StreamOpenRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOpenResponse {
    /// Whether the device accepted the stream.
    pub accept: bool,
}

impl StreamOpenResponse {
    /// Creates an accepting response.
    #[inline]
    #[must_use]
    pub const fn accept() -> Self {
        Self { accept: true }
    }

    /// Creates a rejecting response.
    #[inline]
    #[must_use]
    pub const fn reject() -> Self {
        Self { accept: false }
    }

    /// Returns `true` if the stream was accepted.
    #[inline]
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.accept
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "name": "test",
            "url": "wss://gw.example.com:443/streams/abc",
            "authorizationToken": "tok1"
        }"#;

        let request = StreamOpenRequest::from_json(json).unwrap();
        assert_eq!(request.name, "test");
        assert_eq!(request.url, "wss://gw.example.com:443/streams/abc");
        assert_eq!(request.authorization_token, "tok1");
        assert!(request.request_id.is_none());
    }

    #[test]
    fn test_request_from_json_with_request_id() {
        let json = r#"{"name":"s","url":"ws://h/p","authorizationToken":"t","requestId":"7"}"#;
        let request = StreamOpenRequest::from_json(json).unwrap();
        assert_eq!(request.request_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_request_missing_token_fails() {
        let json = r#"{"name":"s","url":"ws://h/p"}"#;
        let err = StreamOpenRequest::from_json(json).unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = StreamOpenRequest::new("s", "ws://h/p", "t");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["authorizationToken"], "t");
        assert!(json.get("requestId").is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let request = StreamOpenRequest::new("s", "ws://h/p", "super-secret");
        let debug = format!("{request:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_response_constructors() {
        assert!(StreamOpenResponse::accept().is_accepted());
        assert!(!StreamOpenResponse::reject().is_accepted());
    }
}
