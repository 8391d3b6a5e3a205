//! Unified error type for Gamelink.

use gamelink_dispatch::HandlerError;
use gamelink_protocol::ProtocolError;
use gamelink_session::SessionError;
use gamelink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Using the `gamelink` crate you deal with this single type instead of
/// importing errors from each layer; `?` converts them automatically.
#[derive(Debug, thiserror::Error)]
pub enum GamelinkError {
    /// Connecting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding, framing, or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A message handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid JSON for [`SessionConfig`].
    ///
    /// [`SessionConfig`]: gamelink_session::SessionConfig
    #[error("config parse: {0}")]
    Config(#[from] serde_json::Error),

    /// The tracing subscriber could not be installed.
    #[error("telemetry: {0}")]
    Telemetry(String),
}
