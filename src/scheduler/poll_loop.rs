//! Cooperative poll loop.
//!
//! One tick advances the hub client, then the bridge's sessions, in that
//! order. Between ticks the loop sleeps for the configured interval. The
//! loop ends at the first tick boundary after the [`RunToken`] stops, then
//! tears everything down.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{error, info};

use crate::bridge::{DEFAULT_DRAIN_TIMEOUT, StreamBridge, StreamSummary};
use crate::hub::HubClient;

use super::run_token::{RunToken, StopReason};

// ============================================================================
// RunOutcome
// ============================================================================

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Why the run stopped.
    pub reason: StopReason,
    /// Ticks executed.
    pub ticks: u64,
    /// One summary per stream, in finishing order.
    pub streams: Vec<StreamSummary>,
}

impl RunOutcome {
    /// Returns the process exit code for this outcome.
    ///
    /// | Code | Reason |
    /// |------|--------|
    /// | 0 | relay completed |
    /// | 1 | stream session failed |
    /// | 2 | gateway closed before the relay completed |
    /// | 3 | hub subscription failed |
    /// | 130 | cancelled |
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.reason {
            StopReason::Completed => 0,
            StopReason::Failed { .. } => 1,
            StopReason::PeerClosed { .. } => 2,
            StopReason::HubFailed { .. } => 3,
            StopReason::Cancelled => 130,
        }
    }

    /// Returns `true` for a completed relay.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

// ============================================================================
// PollLoop
// ============================================================================

/// Drives a hub client and a bridge on one task.
#[derive(Debug)]
pub struct PollLoop<H> {
    hub: H,
    bridge: StreamBridge,
    run: RunToken,
    tick_interval: Duration,
    drain_timeout: Duration,
    ticks: u64,
}

impl<H: HubClient> PollLoop<H> {
    /// Creates a loop around a hub client and a bridge.
    ///
    /// The loop observes the bridge's run token and uses its tick interval.
    #[must_use]
    pub fn new(hub: H, bridge: StreamBridge) -> Self {
        let run = bridge.run_token().clone();
        let tick_interval = bridge.options().tick_interval;
        Self {
            hub,
            bridge,
            run,
            tick_interval,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            ticks: 0,
        }
    }

    /// Sets how long teardown waits for close handshakes.
    #[inline]
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Runs one tick.
    ///
    /// Returns `false` without doing anything once the run token is stopped.
    pub fn tick(&mut self) -> bool {
        if !self.run.is_running() {
            return false;
        }

        self.hub.do_work(&mut self.bridge);
        if self.run.is_running() {
            self.bridge.do_work();
        }

        self.ticks += 1;
        self.run.is_running()
    }

    /// Subscribes to stream requests and ticks until the run stops.
    ///
    /// Teardown always runs: sessions are closed, their socket tasks drained
    /// and the hub client destroyed.
    pub async fn run(&mut self) -> RunOutcome {
        match self.hub.enable_stream_requests() {
            Ok(()) => info!(transport = %self.hub.transport(), "Waiting for stream requests"),
            Err(e) => {
                error!(error = %e, "Failed to subscribe to stream requests");
                self.run.stop(StopReason::HubFailed {
                    message: e.to_string(),
                });
            }
        }

        while self.tick() {
            tokio::time::sleep(self.tick_interval).await;
        }

        self.shutdown().await
    }

    /// Returns the run token.
    #[inline]
    #[must_use]
    pub fn run_token(&self) -> &RunToken {
        &self.run
    }

    /// Returns the ticks executed so far.
    #[inline]
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the hub client.
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// Returns the hub client mutably.
    #[inline]
    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    /// Returns the bridge.
    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &StreamBridge {
        &self.bridge
    }

    async fn shutdown(&mut self) -> RunOutcome {
        self.bridge.teardown();
        self.bridge.drain(self.drain_timeout).await;
        self.hub.destroy();

        let reason = self.run.reason().unwrap_or(StopReason::Cancelled);
        info!(%reason, ticks = self.ticks, streams = self.bridge.history().len(), "Run finished");

        RunOutcome {
            reason,
            ticks: self.ticks,
            streams: self.bridge.history().to_vec(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
