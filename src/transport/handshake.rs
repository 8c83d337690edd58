//! WebSocket upgrade request construction.
//!
//! The streaming gateway authenticates the device through a bearer token in
//! the upgrade request, and expects an advisory sub-protocol label.
//!
//! The label is advisory only. tungstenite refuses an upgrade whose response
//! does not echo a requested sub-protocol, so a gateway that ignores the
//! label is reconnected once with [`without_sub_protocol`].

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};

use crate::error::{Error, Result};
use crate::protocol::UrlDescriptor;

// ============================================================================
// Functions
// ============================================================================

/// Formats the `Authorization` header value for a token.
#[inline]
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Builds the client upgrade request for a gateway.
///
/// # Arguments
///
/// * `descriptor` - Gateway host, port and resource path
/// * `auth_token` - Bearer token from the stream request
/// * `sub_protocol` - Advisory `Sec-WebSocket-Protocol` label
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the token or label cannot be carried in
/// an HTTP header, or the URL is rejected by the client.
pub fn build_request(
    descriptor: &UrlDescriptor,
    auth_token: &str,
    sub_protocol: &str,
) -> Result<Request> {
    if auth_token.is_empty() {
        return Err(Error::handshake("authorization token is empty"));
    }

    let mut request = descriptor
        .ws_url()
        .into_client_request()
        .map_err(|e| Error::handshake(format!("invalid upgrade request: {e}")))?;

    let auth_value = HeaderValue::from_str(&bearer(auth_token))
        .map_err(|_| Error::handshake("authorization token is not a valid header value"))?;

    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, auth_value);

    if !sub_protocol.is_empty() {
        let protocol_value = HeaderValue::from_str(sub_protocol).map_err(|_| {
            Error::handshake(format!("sub-protocol '{sub_protocol}' is not a valid header value"))
        })?;
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol_value);
    }

    Ok(request)
}

/// Returns a copy of `request` without the `Sec-WebSocket-Protocol` header.
///
/// `None` if the request carries no label, so there is nothing to retry.
#[must_use]
pub fn without_sub_protocol(request: &Request) -> Option<Request> {
    if !request.headers().contains_key(SEC_WEBSOCKET_PROTOCOL) {
        return None;
    }

    let mut retry = Request::new(());
    *retry.method_mut() = request.method().clone();
    *retry.uri_mut() = request.uri().clone();
    *retry.version_mut() = request.version();
    *retry.headers_mut() = request.headers().clone();
    retry.headers_mut().remove(SEC_WEBSOCKET_PROTOCOL);
    Some(retry)
}

/// Returns `true` if the upgrade failed only because the gateway did not
/// echo the requested sub-protocol.
#[inline]
#[must_use]
pub fn is_unechoed_sub_protocol(error: &WsError) -> bool {
    matches!(
        error,
        WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::NoSubProtocol
        ))
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> UrlDescriptor {
        UrlDescriptor::parse("ws://127.0.0.1:9001/streams/abc").unwrap()
    }

    #[test]
    fn test_bearer_format() {
        assert_eq!(bearer("tok1"), "Bearer tok1");
    }

    #[test]
    fn test_request_carries_headers() {
        let request = build_request(&descriptor(), "tok1", "MQTT").unwrap();

        assert_eq!(request.uri().to_string(), "ws://127.0.0.1:9001/streams/abc");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok1");
        assert_eq!(request.headers()[SEC_WEBSOCKET_PROTOCOL], "MQTT");
    }

    #[test]
    fn test_empty_sub_protocol_is_omitted() {
        let request = build_request(&descriptor(), "tok1", "").unwrap();
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn test_without_sub_protocol_keeps_other_headers() {
        let request = build_request(&descriptor(), "tok1", "MQTT").unwrap();
        let retry = without_sub_protocol(&request).unwrap();

        assert_eq!(retry.uri(), request.uri());
        assert_eq!(retry.headers()[AUTHORIZATION], "Bearer tok1");
        assert!(retry.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn test_without_sub_protocol_none_when_unlabelled() {
        let request = build_request(&descriptor(), "tok1", "").unwrap();
        assert!(without_sub_protocol(&request).is_none());
    }

    #[test]
    fn test_unechoed_sub_protocol_detected() {
        let unechoed = WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::NoSubProtocol,
        ));
        let invalid = WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
            SubProtocolError::InvalidSubProtocol,
        ));

        assert!(is_unechoed_sub_protocol(&unechoed));
        assert!(!is_unechoed_sub_protocol(&invalid));
        assert!(!is_unechoed_sub_protocol(&WsError::ConnectionClosed));
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = build_request(&descriptor(), "", "MQTT").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let err = build_request(&descriptor(), "tok\r\nX-Evil: 1", "MQTT").unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
        assert!(!err.to_string().contains("Evil"));
    }
}
