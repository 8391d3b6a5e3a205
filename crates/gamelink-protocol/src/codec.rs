//! Payload codecs: how application messages become opaque payload bytes.
//!
//! The wire envelope never looks inside its payload. Game code picks a
//! [`Codec`] and the session uses it for outbound messages, typed
//! handlers, and the heartbeat payloads. Swapping JSON for a binary
//! format means providing another implementation of this trait; nothing
//! else changes.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values into payload bytes and decodes them back.
///
/// `Send + Sync + 'static` because codecs are shared with handlers that
/// live in the registry for the lifetime of a session.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a fresh buffer.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Serializes a value by appending to `buf`.
    ///
    /// The session calls this with a pooled envelope's payload buffer so
    /// its capacity is reused between sends.
    fn encode_into<T: Serialize>(
        &self,
        value: &T,
        buf: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let bytes = self.encode(value)?;
        buf.extend_from_slice(&bytes);
        Ok(())
    }

    /// Deserializes payload bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable payloads make packet captures easy to read during
/// development. Enabled by the default `json` feature.
///
/// ```rust
/// use gamelink_protocol::{Codec, Heartbeat, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Heartbeat { client_time: 5000 }).unwrap();
/// let decoded: Heartbeat = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.client_time, 5000);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn encode_into<T: Serialize>(
        &self,
        value: &T,
        buf: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        // `&mut Vec<u8>` is an `io::Write`, so serde_json writes in place.
        serde_json::to_writer(buf, value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Heartbeat, HeartbeatAck};

    #[test]
    fn test_json_encode_into_appends_to_existing_buffer() {
        let mut buf = b"prefix:".to_vec();
        JsonCodec
            .encode_into(&Heartbeat { client_time: 7 }, &mut buf)
            .unwrap();
        assert_eq!(buf, br#"prefix:{"client_time":7}"#);
    }

    #[test]
    fn test_json_decode_wrong_shape_returns_decode_error() {
        let result: Result<HeartbeatAck, _> = JsonCodec.decode(br#"{"name":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_decode_garbage_returns_decode_error() {
        let result: Result<Heartbeat, _> = JsonCodec.decode(b"\x00\x01not json");
        assert!(result.is_err());
    }
}
