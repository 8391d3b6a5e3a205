//! Inbound dispatch for Gamelink.
//!
//! Messages arrive on the transport's I/O tasks and are handled on the
//! program's own tick:
//!
//! 1. The transport callback decodes into envelopes recycled through an
//!    [`Inbox`] and pushes them onto it.
//! 2. Each [`Dispatcher::tick`] swaps the inbox into its front queue and
//!    routes a bounded number of envelopes.
//! 3. The [`HandlerRegistry`] runs every [`Handler`] registered for the
//!    envelope's opcode, isolating errors and panics per handler.
//!
//! Bursts are smoothed across ticks instead of stalling a single one.

mod dispatcher;
mod error;
mod handler;
mod registry;

pub use dispatcher::{Dispatcher, Inbox, MAX_PER_TICK, Route};
pub use error::HandlerError;
pub use handler::{Handler, Typed};
pub use registry::{HandlerId, HandlerRegistry};
