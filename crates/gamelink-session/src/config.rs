//! Session and heartbeat configuration.

use std::time::Duration;

use gamelink_protocol::{EnvelopePool, MessageCodec};
use gamelink_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Liveness probing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Time between probes while the connection is open.
    pub interval: Duration,
    /// How long without an acknowledgment before the peer counts as
    /// unresponsive.
    pub stale_threshold: Duration,
    /// Upper bound of the random delay before the first probe after each
    /// open, so clients reconnecting together don't probe in lockstep.
    pub initial_jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            stale_threshold: Duration::from_secs(6),
            initial_jitter: Duration::from_millis(250),
        }
    }
}

impl HeartbeatConfig {
    /// Shortest probe interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `interval` raised to [`Self::MIN_INTERVAL`].
    /// - `stale_threshold` raised to at least twice `interval`, otherwise
    ///   every probe would race its own staleness check.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "heartbeat interval too small — clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        let floor = self.interval * 2;
        if self.stale_threshold < floor {
            warn!(
                stale_ms = self.stale_threshold.as_millis() as u64,
                floor_ms = floor.as_millis() as u64,
                "stale_threshold below two intervals — clamping"
            );
            self.stale_threshold = floor;
        }
        self
    }
}

/// Everything a [`Session`](crate::Session) needs besides its connector,
/// endpoint, and codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub heartbeat: HeartbeatConfig,
    /// Envelopes routed per [`tick`](crate::Session::tick).
    pub max_per_tick: usize,
    /// Idle envelopes kept in the pool between ticks.
    pub pool_capacity: usize,
    /// Largest frame body accepted or produced.
    pub max_frame_len: usize,
    /// Routing hint stamped on every outbound envelope.
    pub routing_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            max_per_tick: gamelink_dispatch::MAX_PER_TICK,
            pool_capacity: EnvelopePool::DEFAULT_MAX_IDLE,
            max_frame_len: MessageCodec::DEFAULT_MAX_FRAME_LEN,
            routing_id: String::new(),
        }
    }
}

impl SessionConfig {
    /// Smallest frame limit accepted; room for the body header and a
    /// little payload.
    pub const MIN_FRAME_LEN: usize = 64;

    /// Clamp out-of-range values, including the nested configs.
    ///
    /// Called automatically by [`Session::new`](crate::Session::new).
    pub fn validated(mut self) -> Self {
        self.transport = self.transport.validated();
        self.heartbeat = self.heartbeat.validated();
        if self.max_per_tick == 0 {
            warn!("max_per_tick must be non-zero — using 1");
            self.max_per_tick = 1;
        }
        if self.max_frame_len < Self::MIN_FRAME_LEN {
            warn!(
                max_frame_len = self.max_frame_len,
                min = Self::MIN_FRAME_LEN,
                "max_frame_len too small — clamping"
            );
            self.max_frame_len = Self::MIN_FRAME_LEN;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.max_per_tick, 16);
        assert_eq!(cfg.pool_capacity, 256);
        assert_eq!(cfg.max_frame_len, 4 * 1024 * 1024);
        assert_eq!(cfg.heartbeat.stale_threshold, Duration::from_secs(6));
        assert!(cfg.routing_id.is_empty());
    }

    #[test]
    fn test_validated_clamps_heartbeat() {
        let cfg = HeartbeatConfig {
            interval: Duration::ZERO,
            stale_threshold: Duration::ZERO,
            ..HeartbeatConfig::default()
        }
        .validated();
        assert_eq!(cfg.interval, HeartbeatConfig::MIN_INTERVAL);
        assert_eq!(cfg.stale_threshold, HeartbeatConfig::MIN_INTERVAL * 2);
    }

    #[test]
    fn test_validated_clamps_session_limits() {
        let cfg = SessionConfig {
            max_per_tick: 0,
            max_frame_len: 1,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(cfg.max_per_tick, 1);
        assert_eq!(cfg.max_frame_len, SessionConfig::MIN_FRAME_LEN);
    }

    #[test]
    fn test_partial_json_fills_nested_defaults() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"routing_id":"shard-3","transport":{"max_retries":1}}"#,
        )
        .unwrap();
        assert_eq!(cfg.routing_id, "shard-3");
        assert_eq!(cfg.transport.max_retries, 1);
        assert_eq!(cfg.transport.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.heartbeat, HeartbeatConfig::default());
    }
}
