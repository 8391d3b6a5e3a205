use crate::ConnectionState;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint string could not be turned into a connect request.
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The underlying connect attempt failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A send was attempted while the connection was not open.
    #[error("send rejected: connection is {state}")]
    SendRejected { state: ConnectionState },

    /// No open or error callback arrived before the watchdog deadline.
    #[error("connect attempt {generation} timed out")]
    ConnectTimeout { generation: u64 },

    /// Every allowed connect attempt failed or timed out.
    #[error("gave up after {attempts} connect attempts")]
    ConnectExhausted { attempts: u32 },
}
