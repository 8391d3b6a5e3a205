use gamelink_protocol::ProtocolError;
use gamelink_transport::TransportError;

/// Errors surfaced by the session's `try_*` operations.
///
/// The plain operations (`send`, `tick`) absorb these and log instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport refused or failed the operation, e.g. a send while
    /// the connection is not open.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The message could not be encoded or framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
