//! The envelope that travels on the wire, and the heartbeat payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// Numeric identifier selecting which handler(s) process a payload.
///
/// Opcodes are agreed between client and server out of band. `1` and `2`
/// are reserved for the heartbeat exchange; everything else is free-form,
/// e.g. `101`/`102` for a map-enter request and response.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Opcode(pub i32);

impl Opcode {
    /// Client → server liveness probe carrying the client's timestamp.
    pub const HEARTBEAT_REQUEST: Opcode = Opcode(1);

    /// Server → client acknowledgment echoing the probe's timestamp.
    pub const HEARTBEAT_RESPONSE: Opcode = Opcode(2);

    /// Whether this opcode belongs to the session itself rather than to
    /// application handlers.
    pub fn is_reserved(self) -> bool {
        self == Self::HEARTBEAT_REQUEST || self == Self::HEARTBEAT_RESPONSE
    }
}

impl From<i32> for Opcode {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// The framed unit of wire communication.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ opcode: 101                  │  ← routing key for handlers
/// │ routing_id: "shard-3"        │  ← session/shard hint, may be empty
/// │ payload: [...opaque bytes...]│  ← serialized application message
/// └──────────────────────────────┘
/// ```
///
/// Envelopes are recycled through [`EnvelopePool`](crate::EnvelopePool):
/// the fields are `String`/`Vec` so clearing them keeps their capacity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageEnvelope {
    pub opcode: Opcode,
    pub routing_id: String,
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    pub fn new(opcode: Opcode, routing_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            routing_id: routing_id.into(),
            payload,
        }
    }

    /// Resets every field while keeping allocated capacity.
    pub fn clear(&mut self) {
        self.opcode = Opcode::default();
        self.routing_id.clear();
        self.payload.clear();
    }
}

// ---------------------------------------------------------------------------
// Heartbeat payloads
// ---------------------------------------------------------------------------

/// Payload of [`Opcode::HEARTBEAT_REQUEST`].
///
/// `client_time` is milliseconds since the sending session's clock epoch.
/// The server echoes it back untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub client_time: u64,
}

/// Payload of [`Opcode::HEARTBEAT_RESPONSE`].
///
/// The echoed `client_time` drives staleness on the client. `server_time`
/// is informational; servers that don't track time may omit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub client_time: u64,
    #[serde(default)]
    pub server_time: u64,
}
