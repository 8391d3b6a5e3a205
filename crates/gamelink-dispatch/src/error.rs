use gamelink_protocol::ProtocolError;

/// Why a handler did not complete.
///
/// Handler errors never leave the registry: each one is logged and the
/// remaining handlers and envelopes still run.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A typed handler could not decode its payload.
    #[error("payload decode failed: {0}")]
    Decode(#[from] ProtocolError),

    /// The handler reported a failure of its own.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler panicked. Carries the panic message when it was a
    /// string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
