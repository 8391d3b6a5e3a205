//! Binary framing for [`MessageEnvelope`]s.
//!
//! Every frame is length-prefixed, so a buffer holding several frames
//! back to back splits unambiguously:
//!
//! ```text
//! frame := body_len:u32be | body
//! body  := opcode:i32be | routing_len:u16be | routing_id:utf8 | payload
//! ```
//!
//! The payload runs to the end of the body; it has no length of its own.

use crate::{DecodeError, MessageEnvelope, Opcode, ProtocolError};

/// Size of the `body_len` prefix.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed part of a body: opcode + routing length.
const BODY_HEADER_SIZE: usize = 4 + 2;

/// Encodes envelopes into frames and decodes frames into envelopes.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_frame_len: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_FRAME_LEN)
    }
}

impl MessageCodec {
    /// Default cap on a frame body (4 MiB).
    pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

    /// Creates a codec rejecting bodies larger than `max_frame_len`.
    ///
    /// The cap is clamped to what the `u32` prefix can express.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: max_frame_len.min(u32::MAX as usize),
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Encodes one frame.
    ///
    /// # Errors
    /// [`ProtocolError::Oversized`] if the routing id does not fit in a
    /// `u16` length or the body exceeds the frame limit.
    pub fn encode(
        &self,
        opcode: Opcode,
        routing_id: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        if routing_id.len() > u16::MAX as usize {
            return Err(ProtocolError::Oversized {
                what: "routing id",
                len: routing_id.len(),
                max: u16::MAX as usize,
            });
        }
        let body_len = BODY_HEADER_SIZE + routing_id.len() + payload.len();
        if body_len > self.max_frame_len {
            return Err(ProtocolError::Oversized {
                what: "frame",
                len: body_len,
                max: self.max_frame_len,
            });
        }

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + body_len);
        frame.extend_from_slice(&(body_len as u32).to_be_bytes());
        frame.extend_from_slice(&opcode.0.to_be_bytes());
        frame.extend_from_slice(&(routing_id.len() as u16).to_be_bytes());
        frame.extend_from_slice(routing_id.as_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Encodes one frame from an existing envelope.
    pub fn encode_envelope(&self, envelope: &MessageEnvelope) -> Result<Vec<u8>, ProtocolError> {
        self.encode(envelope.opcode, &envelope.routing_id, &envelope.payload)
    }

    /// Decodes a buffer holding exactly one frame.
    pub fn decode(&self, bytes: &[u8]) -> Result<MessageEnvelope, DecodeError> {
        let mut envelope = MessageEnvelope::default();
        self.decode_into(bytes, &mut envelope)?;
        Ok(envelope)
    }

    /// Decodes a buffer holding exactly one frame into a recycled envelope.
    ///
    /// On error the envelope's contents are unspecified but its
    /// allocations remain usable.
    pub fn decode_into(
        &self,
        bytes: &[u8],
        envelope: &mut MessageEnvelope,
    ) -> Result<(), DecodeError> {
        let (body, rest) = self.split_frame(bytes)?;
        if !rest.is_empty() {
            return Err(DecodeError::TrailingBytes(rest.len()));
        }
        decode_body(body, envelope)
    }

    /// Iterates over every frame in a buffer of concatenated frames.
    ///
    /// A frame whose body is malformed yields an error and iteration moves
    /// on to the next frame. A bad length prefix yields an error and ends
    /// iteration, since the next frame boundary is unknown.
    pub fn decode_all<'a>(&self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            codec: *self,
            remaining: bytes,
        }
    }

    /// Splits the first frame off `bytes`, returning its body and the rest.
    fn split_frame<'a>(&self, bytes: &'a [u8]) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
        let Some((prefix, rest)) = bytes.split_first_chunk::<LENGTH_PREFIX_SIZE>() else {
            return Err(DecodeError::Truncated {
                needed: LENGTH_PREFIX_SIZE,
                available: bytes.len(),
            });
        };
        let body_len = u32::from_be_bytes(*prefix) as usize;
        if body_len > self.max_frame_len {
            return Err(DecodeError::FrameTooLarge {
                len: body_len,
                max: self.max_frame_len,
            });
        }
        if rest.len() < body_len {
            return Err(DecodeError::Truncated {
                needed: LENGTH_PREFIX_SIZE + body_len,
                available: bytes.len(),
            });
        }
        Ok(rest.split_at(body_len))
    }
}

fn decode_body(body: &[u8], envelope: &mut MessageEnvelope) -> Result<(), DecodeError> {
    let Some((header, rest)) = body.split_first_chunk::<BODY_HEADER_SIZE>() else {
        return Err(DecodeError::Truncated {
            needed: BODY_HEADER_SIZE,
            available: body.len(),
        });
    };
    let opcode = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let routing_len = u16::from_be_bytes([header[4], header[5]]) as usize;
    if rest.len() < routing_len {
        return Err(DecodeError::Truncated {
            needed: BODY_HEADER_SIZE + routing_len,
            available: body.len(),
        });
    }
    let (routing, payload) = rest.split_at(routing_len);
    let routing = std::str::from_utf8(routing)?;

    envelope.clear();
    envelope.opcode = Opcode(opcode);
    envelope.routing_id.push_str(routing);
    envelope.payload.extend_from_slice(payload);
    Ok(())
}

/// Iterator returned by [`MessageCodec::decode_all`].
#[derive(Debug)]
pub struct Frames<'a> {
    codec: MessageCodec,
    remaining: &'a [u8],
}

impl Frames<'_> {
    /// `true` once every frame has been yielded.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Decodes the next frame into a recycled envelope. Returns `None`
    /// once the buffer is exhausted, leaving `envelope` untouched.
    pub fn next_into(
        &mut self,
        envelope: &mut MessageEnvelope,
    ) -> Option<Result<(), DecodeError>> {
        if self.remaining.is_empty() {
            return None;
        }
        match self.codec.split_frame(self.remaining) {
            Ok((body, rest)) => {
                self.remaining = rest;
                Some(decode_body(body, envelope))
            }
            Err(e) => {
                self.remaining = &[];
                Some(Err(e))
            }
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<MessageEnvelope, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut envelope = MessageEnvelope::default();
        let result = self.next_into(&mut envelope)?;
        Some(result.map(|()| envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MessageCodec {
        MessageCodec::default()
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let cases: [(i32, &str, &[u8]); 4] = [
            (101, "shard-3", b"{\"map\":1}"),
            (2, "", b""),
            (-7, "ルーティング", &[0, 255, 1, 254]),
            (i32::MAX, "r", &[42; 300]),
        ];
        for (opcode, routing, payload) in cases {
            let frame = codec().encode(Opcode(opcode), routing, payload).unwrap();
            let env = codec().decode(&frame).unwrap();
            assert_eq!(env.opcode, Opcode(opcode));
            assert_eq!(env.routing_id, routing);
            assert_eq!(env.payload, payload);
        }
    }

    /// Edge lengths for each field crossed with each other, then a seeded
    /// sweep of random triples decoded one by one and as a single stream.
    #[test]
    fn test_round_trip_sweep() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x6a6c);
        let random_bytes = |rng: &mut StdRng, len: usize| {
            let mut bytes = vec![0u8; len];
            rng.fill(&mut bytes[..]);
            bytes
        };

        let opcodes = [i32::MIN, -1, 0, 1, 2, 101, i32::MAX];
        let routings = [
            String::new(),
            "a".to_string(),
            "シャード-7".to_string(),
            "r".repeat(u16::MAX as usize),
        ];
        let payloads = [
            Vec::new(),
            vec![0],
            random_bytes(&mut rng, u16::MAX as usize),
            random_bytes(&mut rng, 1024),
        ];

        let mut cases = Vec::new();
        for &opcode in &opcodes {
            for routing in &routings {
                for payload in &payloads {
                    cases.push((opcode, routing.clone(), payload.clone()));
                }
            }
        }
        for _ in 0..500 {
            let routing_len = rng.random_range(0..64);
            let routing: String = (0..routing_len)
                .map(|_| char::from(rng.random_range(b'!'..=b'~')))
                .collect();
            let payload_len = rng.random_range(0..2048);
            let payload = random_bytes(&mut rng, payload_len);
            cases.push((rng.random::<i32>(), routing, payload));
        }

        let mut stream = Vec::new();
        for (opcode, routing, payload) in &cases {
            let frame = codec().encode(Opcode(*opcode), routing, payload).unwrap();
            let env = codec().decode(&frame).unwrap();
            assert_eq!(env.opcode, Opcode(*opcode));
            assert_eq!(&env.routing_id, routing);
            assert_eq!(&env.payload, payload);
            stream.extend(frame);
        }

        let decoded: Vec<MessageEnvelope> = codec()
            .decode_all(&stream)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(decoded.len(), cases.len());
        for (env, (opcode, routing, payload)) in decoded.iter().zip(&cases) {
            assert_eq!(env.opcode, Opcode(*opcode));
            assert_eq!(&env.routing_id, routing);
            assert_eq!(&env.payload, payload);
        }
    }

    #[test]
    fn test_encode_layout_is_big_endian_length_prefixed() {
        let frame = codec().encode(Opcode(0x0102_0304), "ab", &[9]).unwrap();
        assert_eq!(
            frame,
            vec![0, 0, 0, 9, 1, 2, 3, 4, 0, 2, b'a', b'b', 9],
        );
    }

    #[test]
    fn test_decode_truncated_prefix() {
        let err = codec().decode(&[0, 0]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                needed: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_decode_truncated_body() {
        let frame = codec().encode(Opcode(5), "abc", b"payload").unwrap();
        let err = codec().decode(&frame[..frame.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_decode_routing_len_past_body_is_truncated() {
        // body_len = 6, routing_len claims 10 bytes that aren't there.
        let bytes = [0, 0, 0, 6, 0, 0, 0, 5, 0, 10];
        let err = codec().decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_decode_rejects_oversized_length_prefix() {
        let small = MessageCodec::new(16);
        let err = small.decode(&[0, 0, 1, 0]).unwrap_err();
        assert_eq!(err, DecodeError::FrameTooLarge { len: 256, max: 16 });
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_routing_id() {
        let bytes = [0, 0, 0, 8, 0, 0, 0, 5, 0, 2, 0xff, 0xfe];
        let err = codec().decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRoutingId(_)));
    }

    #[test]
    fn test_decode_single_rejects_trailing_bytes() {
        let mut frame = codec().encode(Opcode(5), "", b"x").unwrap();
        frame.extend_from_slice(&[1, 2, 3]);
        assert_eq!(codec().decode(&frame).unwrap_err(), DecodeError::TrailingBytes(3));
    }

    #[test]
    fn test_encode_rejects_oversized_body() {
        let small = MessageCodec::new(8);
        let err = small.encode(Opcode(1), "", &[0; 16]).unwrap_err();
        assert!(matches!(err, ProtocolError::Oversized { what: "frame", .. }));
    }

    #[test]
    fn test_encode_rejects_routing_id_longer_than_u16() {
        let routing = "r".repeat(u16::MAX as usize + 1);
        let err = codec().encode(Opcode(1), &routing, &[]).unwrap_err();
        assert!(matches!(err, ProtocolError::Oversized { what: "routing id", .. }));
    }

    #[test]
    fn test_decode_all_splits_concatenated_frames() {
        let mut stream = Vec::new();
        for opcode in [5, 7, 5] {
            stream.extend(codec().encode(Opcode(opcode), "s", &[opcode as u8]).unwrap());
        }
        let opcodes: Vec<i32> = codec()
            .decode_all(&stream)
            .map(|r| r.unwrap().opcode.0)
            .collect();
        assert_eq!(opcodes, vec![5, 7, 5]);
    }

    #[test]
    fn test_decode_all_skips_bad_body_and_continues() {
        let mut stream = codec().encode(Opcode(5), "", b"a").unwrap();
        stream.extend_from_slice(&[0, 0, 0, 8, 0, 0, 0, 6, 0, 2, 0xff, 0xfe]);
        stream.extend(codec().encode(Opcode(7), "", b"b").unwrap());

        let results: Vec<_> = codec().decode_all(&stream).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().opcode, Opcode(5));
        assert!(matches!(results[1], Err(DecodeError::InvalidRoutingId(_))));
        assert_eq!(results[2].as_ref().unwrap().opcode, Opcode(7));
    }

    #[test]
    fn test_decode_all_stops_after_truncated_tail() {
        let mut stream = codec().encode(Opcode(5), "", b"a").unwrap();
        let second = codec().encode(Opcode(7), "", b"bbbb").unwrap();
        stream.extend_from_slice(&second[..6]);

        let results: Vec<_> = codec().decode_all(&stream).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_next_into_fills_recycled_envelope_per_frame() {
        let mut stream = codec().encode(Opcode(5), "a", b"first").unwrap();
        stream.extend(codec().encode(Opcode(7), "", b"2").unwrap());

        let mut frames = codec().decode_all(&stream);
        let mut env = MessageEnvelope::new(Opcode(99), "stale", vec![0; 64]);
        frames.next_into(&mut env).unwrap().unwrap();
        assert_eq!(env, MessageEnvelope::new(Opcode(5), "a", b"first".to_vec()));
        frames.next_into(&mut env).unwrap().unwrap();
        assert_eq!(env, MessageEnvelope::new(Opcode(7), "", b"2".to_vec()));
        assert!(frames.is_empty());
        assert!(frames.next_into(&mut env).is_none());
    }

    #[test]
    fn test_decode_into_reuses_envelope() {
        let mut env = MessageEnvelope::new(Opcode(99), "old-routing", vec![1, 2, 3, 4]);
        let frame = codec().encode(Opcode(3), "new", b"z").unwrap();
        codec().decode_into(&frame, &mut env).unwrap();
        assert_eq!(env, MessageEnvelope::new(Opcode(3), "new", b"z".to_vec()));
    }
}
