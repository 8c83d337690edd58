//! Stream echo over a loopback gateway.
//!
//! Demonstrates:
//! - Delivering a stream-open request through the in-memory hub
//! - Bearer-authorized WebSocket upgrade with the hub's sub-protocol label
//! - The default echo relay finishing the run after one round-trip
//! - Ctrl+C cancellation and exit codes
//!
//! Usage:
//!   cargo run --example stream_echo
//!   cargo run --example stream_echo -- --debug
//!   cargo run --example stream_echo -- --transport amqp-ws --message ping

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use device_stream_bridge::{
    BridgeOptions, ChannelHub, PollLoop, Result, RunToken, StreamBridge, StreamOpenRequest,
};

// ============================================================================
// Constants
// ============================================================================

const TOKEN: &str = "demo-token";

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("\n[ERROR] {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    println!("=== Stream Echo ===\n");

    // ========================================================================
    // Gateway
    // ========================================================================

    let (addr, gateway) = common::spawn_loopback_gateway(TOKEN, args.message.clone()).await?;
    println!("[Setup] Gateway listening on {addr}");

    // ========================================================================
    // Hub and Bridge
    // ========================================================================

    let hub = ChannelHub::new(args.transport);
    let request = StreamOpenRequest::new("demo", format!("ws://{addr}/streams/demo"), TOKEN)
        .with_request_id("demo-1");
    hub.handle().push(request)?;
    println!("[Setup] Stream request queued on {} hub\n", args.transport);

    let options = BridgeOptions::new().with_transport(args.transport);
    let bridge = StreamBridge::new(options, RunToken::new())?;
    let mut poll = PollLoop::new(hub, bridge);

    let token = poll.run_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    // ========================================================================
    // Run
    // ========================================================================

    let outcome = poll.run().await;
    gateway.abort();

    println!("\n[Result] {} after {} ticks", outcome.reason, outcome.ticks);
    for stream in &outcome.streams {
        println!(
            "         {} -> {} (received {}, sent {})",
            stream.name, stream.outcome, stream.frames_received, stream.frames_sent
        );
    }
    println!("         exit code {}", outcome.exit_code());

    Ok(outcome.exit_code())
}
