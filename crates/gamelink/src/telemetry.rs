//! Tracing subscriber setup for programs built on Gamelink.
//!
//! The library crates only emit `tracing` events; installing a subscriber
//! is left to the binary. These helpers cover the common case.
//!
//! Levels used throughout the crates:
//! - ERROR: a handler panicked
//! - WARN: absorbed failures (decode errors, rejected sends, timeouts,
//!   exhaustion, stale heartbeats)
//! - INFO: connections opened and closed
//! - DEBUG: connect attempts, heartbeat round trips
//! - TRACE: generation bookkeeping and per-tick detail

use tracing_subscriber::EnvFilter;

use crate::GamelinkError;

/// Installs a formatting subscriber filtered by `RUST_LOG`, falling back
/// to `info`.
///
/// # Panics
/// If a global subscriber is already set. Use [`try_init`] otherwise.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Installs a formatting subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive` (e.g. `"gamelink=debug,info"`).
///
/// # Errors
/// [`GamelinkError::Telemetry`] if the directive does not parse or a
/// global subscriber is already installed.
pub fn try_init(default_directive: &str) -> Result<(), GamelinkError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| GamelinkError::Telemetry(e.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| GamelinkError::Telemetry(e.to_string()))
}
