//! Local streaming gateway for integration tests.
//!
//! Accepts WebSocket upgrades on 127.0.0.1, records what each handshake
//! carried and plays a fixed [`Script`] on every connection.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderName, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber once; `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("device_stream_bridge=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Script
// ============================================================================

/// What the gateway does on each connection.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Refuse the upgrade with 401.
    pub reject: bool,
    /// Accept without echoing the requested sub-protocol.
    pub ignore_protocol: bool,
    /// Close with this code right after the handshake.
    pub close_first: Option<u16>,
    /// Frames sent after the handshake.
    pub send: Vec<Message>,
    /// Data frames to collect before `close_after`.
    pub expect: usize,
    /// Close with this code once `expect` frames arrived.
    pub close_after: Option<u16>,
}

impl Script {
    /// Sends `frames` and collects the replies; the client closes.
    pub fn exchange(frames: Vec<Message>) -> Self {
        let expect = frames.len();
        Self {
            send: frames,
            expect,
            ..Self::default()
        }
    }

    /// Closes from the gateway side after the replies arrived.
    pub fn then_close(mut self, code: u16) -> Self {
        self.close_after = Some(code);
        self
    }

    /// Accepts upgrades without echoing `Sec-WebSocket-Protocol`.
    pub fn without_protocol_echo(mut self) -> Self {
        self.ignore_protocol = true;
        self
    }

    /// Closes right after the handshake.
    pub fn close_immediately(code: u16) -> Self {
        Self {
            close_first: Some(code),
            ..Self::default()
        }
    }

    /// Refuses the upgrade.
    pub fn reject() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// Recorded
// ============================================================================

/// Headers seen in one upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenHandshake {
    pub path: String,
    pub authorization: Option<String>,
    pub protocol: Option<String>,
}

/// Everything the gateway observed.
#[derive(Debug, Default)]
pub struct Recorded {
    pub handshakes: Vec<SeenHandshake>,
    pub received: Vec<Message>,
    pub client_close: Option<u16>,
}

// ============================================================================
// Gateway
// ============================================================================

/// Test gateway bound to an ephemeral local port.
pub struct Gateway {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    task: JoinHandle<()>,
}

impl Gateway {
    /// Binds and starts accepting.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let shared = Arc::clone(&recorded);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, script.clone(), Arc::clone(&shared)));
            }
        });

        Self {
            addr,
            recorded,
            task,
        }
    }

    /// Returns a `ws://` URL for `path` on this gateway.
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the handshakes seen so far.
    pub fn handshakes(&self) -> Vec<SeenHandshake> {
        self.recorded.lock().handshakes.clone()
    }

    /// Returns the data frames received so far.
    pub fn received(&self) -> Vec<Message> {
        self.recorded.lock().received.clone()
    }

    /// Returns the close code the client sent, if any.
    pub fn client_close(&self) -> Option<u16> {
        self.recorded.lock().client_close
    }

    /// Waits up to two seconds for `condition`.
    pub async fn wait_until(&self, condition: impl Fn(&Recorded) -> bool) -> bool {
        for _ in 0..200 {
            let done = {
                let guard = self.recorded.lock();
                condition(&*guard)
            };
            if done {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Connection
// ============================================================================

fn header(request: &Request, name: &HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn close_frame(code: u16) -> CloseFrame {
    CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    }
}

async fn serve(stream: TcpStream, script: Script, recorded: Arc<Mutex<Recorded>>) {
    let seen = Arc::clone(&recorded);
    let reject = script.reject;
    let echo_protocol = !script.ignore_protocol;

    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        seen.lock().handshakes.push(SeenHandshake {
            path: request.uri().path().to_string(),
            authorization: header(request, &AUTHORIZATION),
            protocol: header(request, &SEC_WEBSOCKET_PROTOCOL),
        });

        if reject {
            let mut error = ErrorResponse::new(Some("unauthorized".to_string()));
            *error.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(error);
        }

        if echo_protocol && let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(response)
    };

    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    if let Some(code) = script.close_first {
        let _ = ws.close(Some(close_frame(code))).await;
        while let Some(Ok(_)) = ws.next().await {}
        return;
    }

    for message in script.send {
        if ws.send(message).await.is_err() {
            return;
        }
    }

    let mut got = 0;
    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(_) | Message::Binary(_) => {
                recorded.lock().received.push(message);
                got += 1;
                if got == script.expect
                    && let Some(code) = script.close_after
                {
                    let _ = ws.close(Some(close_frame(code))).await;
                }
            }
            Message::Close(frame) => {
                recorded.lock().client_close = frame.map(|f| u16::from(f.code));
            }
            _ => {}
        }
    }
}
