//! Hub transport selector.
//!
//! The hub session runs over one of a fixed set of transports. The bridge
//! only borrows its name as the advisory WebSocket sub-protocol label.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// HubTransport
// ============================================================================

/// Transport used by the hub-protocol session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HubTransport {
    /// MQTT over TCP.
    #[default]
    Mqtt,
    /// MQTT over WebSocket.
    MqttWebSockets,
    /// AMQP over TCP.
    Amqp,
    /// AMQP over WebSocket.
    AmqpWebSockets,
    /// HTTP polling.
    Http,
}

impl HubTransport {
    /// All transports, in selector order.
    pub const ALL: [Self; 5] = [
        Self::Mqtt,
        Self::MqttWebSockets,
        Self::Amqp,
        Self::AmqpWebSockets,
        Self::Http,
    ];

    /// Returns the WebSocket sub-protocol label for stream sessions.
    #[inline]
    #[must_use]
    pub const fn sub_protocol(&self) -> &'static str {
        match self {
            Self::Mqtt | Self::MqttWebSockets => "MQTT",
            Self::Amqp | Self::AmqpWebSockets => "AMQP",
            Self::Http => "HTTP",
        }
    }

    /// Returns the selector name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::MqttWebSockets => "mqtt-ws",
            Self::Amqp => "amqp",
            Self::AmqpWebSockets => "amqp-ws",
            Self::Http => "http",
        }
    }

    /// Returns `true` if the hub session itself tunnels over WebSocket.
    #[inline]
    #[must_use]
    pub const fn is_websocket(&self) -> bool {
        matches!(self, Self::MqttWebSockets | Self::AmqpWebSockets)
    }
}

impl fmt::Display for HubTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "mqtt-ws" | "mqtt-websockets" => Ok(Self::MqttWebSockets),
            "amqp" => Ok(Self::Amqp),
            "amqp-ws" | "amqp-websockets" => Ok(Self::AmqpWebSockets),
            "http" => Ok(Self::Http),
            other => Err(Error::config(format!(
                "unknown hub transport '{other}', expected one of: mqtt, mqtt-ws, amqp, amqp-ws, http"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_mqtt() {
        assert_eq!(HubTransport::default(), HubTransport::Mqtt);
    }

    #[test]
    fn test_sub_protocol_labels() {
        assert_eq!(HubTransport::Mqtt.sub_protocol(), "MQTT");
        assert_eq!(HubTransport::MqttWebSockets.sub_protocol(), "MQTT");
        assert_eq!(HubTransport::Amqp.sub_protocol(), "AMQP");
        assert_eq!(HubTransport::AmqpWebSockets.sub_protocol(), "AMQP");
        assert_eq!(HubTransport::Http.sub_protocol(), "HTTP");
    }

    #[test]
    fn test_parse_round_trip() {
        for transport in HubTransport::ALL {
            let parsed: HubTransport = transport.to_string().parse().unwrap();
            assert_eq!(parsed, transport);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("AMQP_WebSockets".parse::<HubTransport>().unwrap(), HubTransport::AmqpWebSockets);
        assert_eq!(" Http ".parse::<HubTransport>().unwrap(), HubTransport::Http);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "coap".parse::<HubTransport>().unwrap_err();
        assert!(err.to_string().contains("unknown hub transport 'coap'"));
    }

    #[test]
    fn test_is_websocket() {
        assert!(HubTransport::MqttWebSockets.is_websocket());
        assert!(!HubTransport::Http.is_websocket());
    }
}
