//! Client session layer for Gamelink.
//!
//! A [`Session`] composes a transport, the inbound dispatcher, and a
//! [`HeartbeatMonitor`] behind four calls: `connect`, `send`, `tick`,
//! `disconnect`. Handler failures, decode errors, and rejected sends are
//! absorbed and logged; only connectivity changes cross the session
//! boundary, as [`SessionEvent`]s.

mod config;
mod error;
mod heartbeat;
mod session;

pub use config::{HeartbeatConfig, SessionConfig};
pub use error::SessionError;
pub use heartbeat::{HeartbeatDecision, HeartbeatMonitor, HeartbeatState, Recovery};
pub use session::{Session, SessionEvent};
