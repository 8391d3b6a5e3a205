//! Liveness probing and staleness detection.
//!
//! The monitor is pure bookkeeping: it never touches the transport. Each
//! tick the session asks it what to do and carries out the answer.
//!
//! # Clock domain
//!
//! Probes carry `client_time`, milliseconds since the monitor's epoch.
//! The server echoes it back, and the echoed value (not the local arrival
//! time) becomes `last_ack_at`. Staleness is therefore "time since the
//! newest probe the server is known to have answered".
//!
//! # Arming
//!
//! A disarmed monitor answers every tick with an empty decision, so a
//! fresh session never dials on its own. The staleness clock restarts in
//! exactly these places:
//!
//! | Event | Call |
//! |---|---|
//! | a connect or reconnect actually starts an attempt | [`arm`](HeartbeatMonitor::arm) |
//! | the transport reports a new open connection | [`reset`](HeartbeatMonitor::reset) |
//! | a recovery is requested | inside [`on_tick`](HeartbeatMonitor::on_tick) |
//! | an acknowledgment arrives | [`on_ack`](HeartbeatMonitor::on_ack) |
//!
//! Exhausting the connect retries or an explicit disconnect disarms it.

use std::time::Duration;

use gamelink_protocol::{Heartbeat, HeartbeatAck};
use gamelink_transport::ConnectionState;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::HeartbeatConfig;

/// What the monitor has observed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatState {
    pub last_sent_at: Option<Instant>,
    pub last_ack_at: Instant,
    /// The probe interval in effect.
    pub interval_budget: Duration,
    /// Round-trip time of the most recent acknowledged probe.
    pub last_rtt: Option<Duration>,
    /// The server's clock as reported by the most recent acknowledgment.
    pub server_time: Option<u64>,
}

/// How the session should bring an unresponsive connection back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The connection is open but the peer stopped answering: tear it
    /// down and dial again.
    Reconnect,
    /// The connection is already down: just dial.
    Connect,
}

/// The monitor's answer for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatDecision {
    pub probe: Option<Heartbeat>,
    pub recovery: Option<Recovery>,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    epoch: Instant,
    state: HeartbeatState,
    next_probe_at: Instant,
    armed: bool,
}

impl HeartbeatMonitor {
    /// Creates a disarmed monitor whose `client_time` counts from `epoch`.
    pub fn new(config: HeartbeatConfig, epoch: Instant) -> Self {
        let config = config.validated();
        Self {
            state: HeartbeatState {
                last_sent_at: None,
                last_ack_at: epoch,
                interval_budget: config.interval,
                last_rtt: None,
                server_time: None,
            },
            next_probe_at: epoch,
            armed: false,
            epoch,
            config,
        }
    }

    /// Starts watching. Staleness counts from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.state.last_ack_at = now;
    }

    /// Stops watching; ticks return no decisions until re-armed.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// A connection just opened: treat it as fresh and schedule the first
    /// probe after a random jitter.
    pub fn reset(&mut self, now: Instant) {
        let jitter_ms = self.config.initial_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        self.state.last_sent_at = None;
        self.state.last_ack_at = now;
        self.next_probe_at = now + jitter;
        trace!(jitter_ms = jitter.as_millis() as u64, "heartbeat reset");
    }

    /// Decides whether to probe and whether the connection needs
    /// recovering.
    ///
    /// A recovery is requested at most once per stale period: requesting
    /// one restarts the staleness clock. Nothing is requested while a
    /// connect attempt is in flight or has just faulted, since the
    /// transport's own retries own that window.
    pub fn on_tick(&mut self, now: Instant, connection: ConnectionState) -> HeartbeatDecision {
        let mut decision = HeartbeatDecision::default();
        if !self.armed {
            return decision;
        }

        let staleness = self.staleness(now);
        if staleness >= self.config.stale_threshold {
            let recovery = match connection {
                ConnectionState::Open => Some(Recovery::Reconnect),
                ConnectionState::Disconnected | ConnectionState::Closing => Some(Recovery::Connect),
                ConnectionState::Connecting | ConnectionState::Faulted => None,
            };
            if let Some(recovery) = recovery {
                warn!(
                    staleness_ms = staleness.as_millis() as u64,
                    state = %connection,
                    ?recovery,
                    "heartbeat stale"
                );
                self.state.last_ack_at = now;
                decision.recovery = Some(recovery);
                return decision;
            }
        }

        if connection.is_open() && now >= self.next_probe_at {
            self.state.last_sent_at = Some(now);
            self.next_probe_at = now + self.config.interval;
            decision.probe = Some(Heartbeat {
                client_time: self.client_time(now),
            });
        }
        decision
    }

    /// Records the server's acknowledgment of a probe.
    pub fn on_ack(&mut self, now: Instant, ack: HeartbeatAck) {
        let sent_at = self.epoch + Duration::from_millis(ack.client_time);
        // An echo from the future would be a lying peer; clamp it.
        let acked_at = sent_at.min(now);
        if acked_at > self.state.last_ack_at {
            self.state.last_ack_at = acked_at;
        }
        let rtt = now.saturating_duration_since(sent_at);
        self.state.last_rtt = Some(rtt);
        self.state.server_time = Some(ack.server_time);
        debug!(
            rtt_ms = rtt.as_millis() as u64,
            server_time = ack.server_time,
            "heartbeat acknowledged"
        );
    }

    /// Milliseconds since the epoch, as carried in probes.
    pub fn client_time(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Time since the last confirmed acknowledgment.
    pub fn staleness(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.last_ack_at)
    }

    pub fn state(&self) -> &HeartbeatState {
        &self.state
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}
