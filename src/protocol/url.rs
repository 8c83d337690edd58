//! Gateway URL decomposition.
//!
//! A stream request names its gateway as `scheme://host[:port]/path`.
//! The session needs the three parts separately: host and port to connect,
//! and an absolute resource name for the upgrade request line.
//!
//! # Example
//!
//! ```ignore
//! use device_stream_bridge::UrlDescriptor;
//!
//! let descriptor = UrlDescriptor::parse("wss://gw.example.com/streams/abc")?;
//! assert_eq!(descriptor.host(), "gw.example.com");
//! assert_eq!(descriptor.port(), 443);
//! assert_eq!(descriptor.path(), "/streams/abc");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted host name, in bytes.
pub const MAX_HOST_LEN: usize = 1024;

/// Longest accepted resource path (including the leading `/`), in bytes.
pub const MAX_PATH_LEN: usize = 1024;

// ============================================================================
// GatewayScheme
// ============================================================================

/// WebSocket scheme of a gateway URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayScheme {
    /// Plain `ws://`.
    Ws,
    /// TLS `wss://`.
    Wss,
}

impl GatewayScheme {
    /// Maps a URL scheme to a WebSocket scheme.
    ///
    /// `http`/`https` are accepted as aliases, the upgrade runs over them anyway.
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ws" | "http" => Some(Self::Ws),
            "wss" | "https" => Some(Self::Wss),
            _ => None,
        }
    }

    /// Returns the scheme string.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }

    /// Returns the port used when the URL names none.
    #[inline]
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }

    /// Returns `true` for `wss`.
    #[inline]
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Wss)
    }
}

impl fmt::Display for GatewayScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// UrlDescriptor
// ============================================================================

/// Host, port and resource path of a streaming gateway.
///
/// Transient: built from a stream request and dropped once the session
/// holding the upgrade request exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlDescriptor {
    scheme: GatewayScheme,
    host: String,
    port: u16,
    path: String,
}

impl UrlDescriptor {
    /// Parses a full gateway URL.
    ///
    /// The path always comes back with exactly one leading `/`, whatever
    /// the source URL looked like. Query strings are kept on the path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UrlParse`] when the URL is malformed, has no host,
    /// a non-numeric port, a non-WebSocket scheme, or a host/path longer
    /// than [`MAX_HOST_LEN`]/[`MAX_PATH_LEN`].
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim()).map_err(|e| Error::url_parse(input, e.to_string()))?;

        let scheme = GatewayScheme::from_scheme(url.scheme()).ok_or_else(|| {
            Error::url_parse(input, format!("unsupported scheme '{}'", url.scheme()))
        })?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(Error::url_parse(input, "missing host")),
        };

        if host.len() > MAX_HOST_LEN {
            return Err(Error::url_parse(
                input,
                format!("host is {} bytes, limit is {MAX_HOST_LEN}", host.len()),
            ));
        }

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let mut path = String::with_capacity(url.path().len() + 1);
        path.push('/');
        path.push_str(url.path().trim_start_matches('/'));
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        if path.len() > MAX_PATH_LEN {
            return Err(Error::url_parse(
                input,
                format!("path is {} bytes, limit is {MAX_PATH_LEN}", path.len()),
            ));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Returns the scheme.
    #[inline]
    #[must_use]
    pub const fn scheme(&self) -> GatewayScheme {
        self.scheme
    }

    /// Returns the host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, defaulted from the scheme when absent in the URL.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the absolute resource path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `host:port/path`.
    #[must_use]
    pub fn authority_path(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.path)
    }

    /// Returns the full WebSocket URL with an explicit port.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority_path())
    }
}

impl fmt::Display for UrlDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ws_url())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_parse_full_url() {
        let d = UrlDescriptor::parse("wss://gw.example.com:443/streams/abc").unwrap();
        assert_eq!(d.scheme(), GatewayScheme::Wss);
        assert_eq!(d.host(), "gw.example.com");
        assert_eq!(d.port(), 443);
        assert_eq!(d.path(), "/streams/abc");
    }

    #[test]
    fn test_parse_default_ports() {
        let secure = UrlDescriptor::parse("wss://gw.example.com/a").unwrap();
        let plain = UrlDescriptor::parse("ws://gw.example.com/a").unwrap();
        assert_eq!(secure.port(), 443);
        assert_eq!(plain.port(), 80);
    }

    #[test]
    fn test_parse_explicit_port() {
        let d = UrlDescriptor::parse("ws://127.0.0.1:9001/tunnel").unwrap();
        assert_eq!(d.host(), "127.0.0.1");
        assert_eq!(d.port(), 9001);
        assert_eq!(d.ws_url(), "ws://127.0.0.1:9001/tunnel");
    }

    #[test]
    fn test_parse_root_path() {
        let d = UrlDescriptor::parse("wss://gw.example.com").unwrap();
        assert_eq!(d.path(), "/");
    }

    #[test]
    fn test_parse_collapses_leading_slashes() {
        let d = UrlDescriptor::parse("wss://gw.example.com//streams//abc").unwrap();
        assert_eq!(d.path(), "/streams//abc");
    }

    #[test]
    fn test_parse_keeps_query() {
        let d = UrlDescriptor::parse("wss://gw.example.com/s/1?api-version=2020").unwrap();
        assert_eq!(d.path(), "/s/1?api-version=2020");
    }

    #[test]
    fn test_parse_https_alias() {
        let d = UrlDescriptor::parse("https://gw.example.com/s").unwrap();
        assert_eq!(d.scheme(), GatewayScheme::Wss);
    }

    #[test]
    fn test_parse_not_a_url() {
        let err = UrlDescriptor::parse("not a url").unwrap_err();
        assert!(matches!(err, Error::UrlParse { .. }));
    }

    #[test]
    fn test_parse_non_numeric_port() {
        let err = UrlDescriptor::parse("wss://gw.example.com:abc/s").unwrap_err();
        assert!(matches!(err, Error::UrlParse { .. }));
    }

    #[test]
    fn test_parse_missing_host() {
        let err = UrlDescriptor::parse("wss://").unwrap_err();
        assert!(matches!(err, Error::UrlParse { .. }));
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = UrlDescriptor::parse("ftp://gw.example.com/s").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_parse_rejects_oversized_path() {
        let url = format!("wss://gw.example.com/{}", "a".repeat(MAX_PATH_LEN));
        let err = UrlDescriptor::parse(&url).unwrap_err();
        assert!(err.to_string().contains("limit is 1024"));
    }

    #[test]
    fn test_parse_accepts_path_at_limit() {
        let url = format!("wss://gw.example.com/{}", "a".repeat(MAX_PATH_LEN - 1));
        let d = UrlDescriptor::parse(&url).unwrap();
        assert_eq!(d.path().len(), MAX_PATH_LEN);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            host in "[a-z][a-z0-9]{0,15}(\\.[a-z][a-z0-9]{0,10}){0,3}",
            port in 1u16..,
            segments in proptest::collection::vec("[A-Za-z0-9_-]{1,12}", 0..5),
        ) {
            let path = segments.join("/");
            let url = format!("wss://{host}:{port}/{path}");
            let d = UrlDescriptor::parse(&url).unwrap();

            prop_assert_eq!(d.host(), host.as_str());
            prop_assert_eq!(d.port(), port);
            prop_assert!(d.path().starts_with('/'));
            prop_assert!(!d.path().starts_with("//"));
            prop_assert_eq!(d.authority_path(), format!("{host}:{port}/{path}"));
        }
    }
}
