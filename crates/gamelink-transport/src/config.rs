//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timeouts and retry limits for establishing a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long a connect attempt may stay unresolved before the watchdog
    /// gives up on it.
    pub connect_timeout: Duration,

    /// How many further attempts follow the first one. Timeouts and
    /// connect errors draw from the same budget.
    pub max_retries: u32,

    /// Pause before retrying after a connect error. Timeouts retry
    /// immediately since the deadline already waited.
    pub retry_delay: Duration,

    /// Capacity of the [`TransportEvent`](crate::TransportEvent) broadcast
    /// channel. Slow subscribers past this many events see a lag.
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            event_capacity: 64,
        }
    }
}

impl TransportConfig {
    /// Smallest connect timeout accepted.
    pub const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(10);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Transport::new`](crate::Transport::new).
    pub fn validated(mut self) -> Self {
        if self.connect_timeout < Self::MIN_CONNECT_TIMEOUT {
            warn!(
                timeout_ms = self.connect_timeout.as_millis() as u64,
                "connect_timeout too small — clamping"
            );
            self.connect_timeout = Self::MIN_CONNECT_TIMEOUT;
        }
        if self.event_capacity == 0 {
            warn!("event_capacity must be non-zero — using 1");
            self.event_capacity = 1;
        }
        self
    }
}
