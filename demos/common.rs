//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - A loopback streaming gateway

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use device_stream_bridge::HubTransport;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub transport: HubTransport,
    pub message: String,
}

impl Args {
    /// Parse command-line arguments.
    ///
    /// `--transport <name>` picks the hub transport, `--message <text>` the
    /// frame the gateway sends.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let transport = match value("--transport").map(|t| t.parse::<HubTransport>()) {
            Some(Ok(transport)) => transport,
            Some(Err(e)) => {
                eprintln!("[WARN] {e}, using mqtt");
                HubTransport::Mqtt
            }
            None => HubTransport::Mqtt,
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            transport,
            message: value("--message").unwrap_or_else(|| "hello".to_string()),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "device_stream_bridge=debug"
    } else {
        "device_stream_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Starts a single-connection gateway on 127.0.0.1.
///
/// Checks the bearer token, sends `message`, prints what comes back and
/// answers the client's close.
pub async fn spawn_loopback_gateway(
    token: &str,
    message: String,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let expected = format!("Bearer {token}");

    let task = tokio::spawn(async move {
        let Ok((stream, peer)) = listener.accept().await else {
            return;
        };

        let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let auth = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            if auth != Some(expected.as_str()) {
                println!("[Gateway] Rejecting {peer}: bad authorization");
                let mut error = ErrorResponse::new(Some("unauthorized".to_string()));
                *error.status_mut() = StatusCode::UNAUTHORIZED;
                return Err(error);
            }
            if let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                println!("[Gateway] Sub-protocol: {}", protocol.to_str().unwrap_or("?"));
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
            }
            println!("[Gateway] Accepted {peer} on {}", request.uri().path());
            Ok(response)
        };

        let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
            return;
        };

        println!("[Gateway] -> {message:?}");
        if ws.send(Message::text(message)).await.is_err() {
            return;
        }

        while let Some(Ok(reply)) = ws.next().await {
            match reply {
                Message::Text(text) => println!("[Gateway] <- {:?}", text.as_str()),
                Message::Binary(data) => println!("[Gateway] <- {} bytes", data.len()),
                Message::Close(frame) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    println!("[Gateway] Client closed ({code})");
                }
                _ => {}
            }
        }
    });

    Ok((addr, task))
}
