//! Wire protocol for Gamelink.
//!
//! This crate defines what travels between a game client and its server:
//!
//! - **Types** ([`MessageEnvelope`], [`Opcode`], [`Heartbeat`]) — the
//!   framed unit of communication and the liveness payloads.
//! - **Frame codec** ([`MessageCodec`]) — the self-delimiting binary
//!   layout that turns envelopes into bytes and splits byte buffers back
//!   into envelopes.
//! - **Payload codecs** ([`Codec`] trait, [`JsonCodec`]) — how
//!   application messages become the opaque payload bytes.
//! - **Pooling** ([`EnvelopePool`]) — reuse of envelope allocations on the
//!   tick thread.
//! - **Errors** ([`ProtocolError`], [`DecodeError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or handlers. It only
//! knows how to frame and unframe messages.
//!
//! ```text
//! Transport (bytes) → Protocol (MessageEnvelope) → Dispatch (handlers)
//! ```

mod codec;
mod envelope;
mod error;
mod frame;
mod pool;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use envelope::{Heartbeat, HeartbeatAck, MessageEnvelope, Opcode};
pub use error::{DecodeError, ProtocolError};
pub use frame::{Frames, MessageCodec};
pub use pool::EnvelopePool;
