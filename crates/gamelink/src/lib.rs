//! # Gamelink
//!
//! Client networking for games driven by a frame loop.
//!
//! A [`Session`](session::Session) owns one connection to a game server.
//! Messages are framed envelopes (opcode, routing id, opaque payload).
//! Inbound messages queue up on the I/O tasks and are handed to your
//! handlers only when you call `tick()`, a bounded number per tick. A
//! heartbeat watches the peer and reconnects when it goes quiet, and the
//! connect watchdog gives up after a bounded number of attempts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gamelink::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct MapEnterRequest { map_id: u32 }
//!
//! #[derive(Deserialize)]
//! struct MapEnterResponse { map_id: u32 }
//!
//! # async fn run() -> Result<(), GamelinkError> {
//! let mut session = SessionBuilder::new("ws://127.0.0.1:9100").build()?;
//! session.on(Opcode(102), |resp: MapEnterResponse| {
//!     println!("entered map {}", resp.map_id);
//!     Ok(())
//! });
//! session.connect();
//!
//! loop {
//!     session.tick();
//!     if session.state().is_open() {
//!         session.send(Opcode(101), &MapEnterRequest { map_id: 1 });
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(33)).await;
//! }
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`protocol`] — envelopes, frame codec, payload codecs, pooling
//! - [`transport`] — connection state machine, watchdog, WebSocket
//! - [`dispatch`] — handler registry and tick-bounded dispatcher
//! - [`session`] — heartbeat and the session facade

mod client;
mod config;
mod error;
pub mod telemetry;

pub use gamelink_dispatch as dispatch;
pub use gamelink_protocol as protocol;
pub use gamelink_session as session;
pub use gamelink_transport as transport;

pub use client::SessionBuilder;
pub use config::load_config;
pub use error::GamelinkError;

/// Everything a typical client needs.
pub mod prelude {
    pub use crate::{GamelinkError, SessionBuilder, load_config};
    pub use gamelink_dispatch::{HandlerError, HandlerId};
    pub use gamelink_protocol::{Codec, JsonCodec, MessageEnvelope, Opcode};
    pub use gamelink_session::{HeartbeatConfig, Session, SessionConfig, SessionEvent};
    pub use gamelink_transport::{
        ConnectionState, Endpoint, TransportConfig, WebSocketConnector,
    };
}
