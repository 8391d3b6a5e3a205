//! Error types for the protocol layer.
//!
//! Two enums live here. [`DecodeError`] is the narrow, typed result of
//! unframing bytes that came off the wire; the transport side drops the
//! offending frame and keeps going. [`ProtocolError`] covers everything
//! else that can go wrong turning values into bytes and back.

/// Why a buffer could not be decoded into a [`MessageEnvelope`].
///
/// [`MessageEnvelope`]: crate::MessageEnvelope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the frame did.
    #[error("truncated frame: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    /// The length prefix announces a body larger than the configured
    /// maximum. Usually a sign of a corrupt or desynchronised stream.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The routing id bytes are not valid UTF-8.
    #[error("routing id is not valid utf-8: {0}")]
    InvalidRoutingId(#[from] std::str::Utf8Error),

    /// A single-frame decode found bytes past the end of the frame.
    #[error("{0} unexpected bytes after frame")]
    TrailingBytes(usize),
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a payload failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserializing a payload failed: malformed bytes, missing fields,
    /// or the wrong message type for this opcode.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A frame could not be unframed.
    #[error(transparent)]
    Frame(#[from] DecodeError),

    /// A field is too large for the wire layout.
    #[error("{what} of {len} bytes exceeds limit of {max}")]
    Oversized {
        what: &'static str,
        len: usize,
        max: usize,
    },
}
