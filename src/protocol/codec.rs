//! logwire frame codec (encode/decode)
//!
//! Frames are `[length (4, LE)] [opcode (1)] [payload (length - 1)]`.

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    Error, FrameHeader, LENGTH_PREFIX_SIZE, Message, OPCODE_SIZE, OpCode, Result,
};
use crate::transport::TimedRead;
use crate::transport::recv::recv_until;

/// Upper bound on a single read while reassembling a frame body.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Encode a message to wire bytes
///
/// # Format
///
/// ```text
/// [LENGTH (4, LE)] [OPCODE (1)] [PAYLOAD (variable)]
/// ```
///
/// # Errors
///
/// - [`Error::SentinelOpCode`] for [`OpCode::None`]
/// - [`Error::TooMuchData`] when opcode + payload exceeds the length prefix
pub fn encode(message: &Message) -> Result<Bytes> {
    let op_byte = message.op_code().as_u8().ok_or(Error::SentinelOpCode)?;
    let payload = message.data();
    let header = FrameHeader::for_payload(payload.len())?;

    let mut bytes = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + header.frame_len());
    bytes.put_slice(&header.to_bytes());
    bytes.put_u8(op_byte);
    bytes.put_slice(payload);

    Ok(bytes.freeze())
}

/// Decode a frame from an in-memory buffer
///
/// A buffer that ends before the declared length yields a message with
/// `data_complete == false`; a buffer without a full prefix or opcode yields
/// [`Message::incomplete`].
///
/// # Errors
///
/// Returns [`Error::UnknownOpCode`] if the opcode byte is not recognized.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let Some((prefix, rest)) = bytes.split_first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Ok(Message::incomplete());
    };
    let frame_len = FrameHeader::from_bytes(*prefix).frame_len();
    let available = rest.len().min(frame_len);
    if available == 0 {
        return Ok(Message::incomplete());
    }

    let op_code = OpCode::from_u8(rest[0])?;
    let data = Bytes::copy_from_slice(&rest[OPCODE_SIZE..available]);
    Ok(Message::from_parts(op_code, data, available == frame_len))
}

/// Read one frame from a socket-like source.
///
/// The prefix and the body are each reassembled from as many partial reads as
/// it takes. `timeout` bounds the whole frame.
pub(crate) fn read_frame<S: TimedRead + ?Sized>(
    source: &S,
    stop: Option<&dyn Fn() -> bool>,
    timeout: Option<Duration>,
) -> Result<Message> {
    let deadline = timeout.map(|t| Instant::now() + t);

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    if fill(source, &mut prefix, stop, deadline)? < LENGTH_PREFIX_SIZE {
        return Ok(Message::incomplete());
    }

    let frame_len = FrameHeader::from_bytes(prefix).frame_len();
    if frame_len == 0 {
        return Ok(Message::incomplete());
    }

    let mut body = BytesMut::with_capacity(frame_len.min(READ_CHUNK_SIZE));
    let mut chunk = vec![0u8; frame_len.min(READ_CHUNK_SIZE)];
    while body.len() < frame_len {
        let want = (frame_len - body.len()).min(chunk.len());
        let read = recv_until(source, &mut chunk[..want], stop, deadline)?;
        if read == 0 {
            break;
        }
        body.put_slice(&chunk[..read]);
    }

    if body.is_empty() {
        return Ok(Message::incomplete());
    }

    let data_complete = body.len() == frame_len;
    let op_code = OpCode::from_u8(body[0])?;
    let data = body.freeze().slice(OPCODE_SIZE..);
    Ok(Message::from_parts(op_code, data, data_complete))
}

fn fill<S: TimedRead + ?Sized>(
    source: &S,
    buf: &mut [u8],
    stop: Option<&dyn Fn() -> bool>,
    deadline: Option<Instant>,
) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = recv_until(source, &mut buf[filled..], stop, deadline)?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{ScriptedSource, Step};

    #[test]
    fn test_encode_layout() {
        let encoded = encode(&Message::json(&b"abc"[..])).unwrap();
        assert_eq!(encoded.as_ref(), &[4, 0, 0, 0, b'j', b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_ack() {
        let encoded = encode(&Message::ack()).unwrap();
        assert_eq!(encoded.as_ref(), &[1, 0, 0, 0, b'k']);
    }

    #[test]
    fn test_encode_sentinel_rejected() {
        let result = encode(&Message::incomplete());
        assert!(matches!(result, Err(Error::SentinelOpCode)));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let result = decode(&[2, 0, 0, 0, b'z', 0]);
        assert!(matches!(result, Err(Error::UnknownOpCode { byte: b'z' })));
    }

    #[test]
    fn test_decode_short_buffer() {
        let decoded = decode(&[10, 0, 0, 0, b'j', b'{']).unwrap();
        assert_eq!(decoded.op_code(), OpCode::Json);
        assert_eq!(decoded.data().as_ref(), b"{");
        assert!(!decoded.data_complete());

        assert_eq!(decode(&[1, 0]).unwrap(), Message::incomplete());
        assert_eq!(decode(&[1, 0, 0, 0]).unwrap(), Message::incomplete());
    }

    #[test]
    fn test_read_frame_reassembles_partial_reads() {
        let source = ScriptedSource::new(vec![
            Step::Data(vec![6, 0]),
            Step::Timeout,
            Step::Data(vec![0, 0, b'j', b'h']),
            Step::Data(vec![b'e', b'l', b'l', b'o']),
        ]);

        let message = read_frame(&source, None, None).unwrap();
        assert_eq!(message, Message::json(&b"hello"[..]));
    }

    #[test]
    fn test_read_frame_underrun_is_incomplete_data() {
        let source = ScriptedSource::new(vec![Step::Data(vec![9, 0, 0, 0, b'j', b'a', b'b'])]);

        let message = read_frame(&source, None, None).unwrap();
        assert_eq!(message.op_code(), OpCode::Json);
        assert_eq!(message.data().as_ref(), b"ab");
        assert!(!message.data_complete());
    }

    #[test]
    fn test_read_frame_peer_closed() {
        let source = ScriptedSource::new(vec![]);
        assert_eq!(read_frame(&source, None, None).unwrap(), Message::incomplete());

        let source = ScriptedSource::new(vec![Step::Data(vec![5, 0])]);
        assert_eq!(read_frame(&source, None, None).unwrap(), Message::incomplete());
    }

    #[test]
    fn test_read_frame_zero_length_prefix() {
        let source = ScriptedSource::new(vec![Step::Data(vec![0, 0, 0, 0, b'k'])]);
        assert_eq!(read_frame(&source, None, None).unwrap(), Message::incomplete());
    }

    #[test]
    fn test_read_frame_stop_before_data() {
        let source = ScriptedSource::silent();
        let stop = || true;
        let message = read_frame(&source, Some(&stop), None).unwrap();
        assert_eq!(message, Message::incomplete());
    }

    #[test]
    fn test_read_frame_timeout() {
        let source = ScriptedSource::silent();
        let started = Instant::now();
        let message = read_frame(&source, None, Some(Duration::from_millis(250))).unwrap();
        assert_eq!(message, Message::incomplete());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_read_frame_unknown_opcode() {
        let source = ScriptedSource::new(vec![Step::Data(vec![1, 0, 0, 0, b'?'])]);
        let result = read_frame(&source, None, None);
        assert!(matches!(result, Err(Error::UnknownOpCode { byte: b'?' })));
    }

    // Property-based tests
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn op_code_strategy() -> impl Strategy<Value = OpCode> {
            prop_oneof![Just(OpCode::Json), Just(OpCode::Ack)]
        }

        fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..=16384)
        }

        proptest! {
            /// Property: Any transmittable message should roundtrip correctly
            #[test]
            fn prop_roundtrip_preserves_data(
                op_code in op_code_strategy(),
                payload in payload_strategy(),
            ) {
                let original = Message::new(op_code, payload);
                let encoded = encode(&original).unwrap();
                let decoded = decode(&encoded).unwrap();

                prop_assert_eq!(decoded, original);
            }

            /// Property: The prefix always counts the opcode byte plus payload
            #[test]
            fn prop_prefix_matches_frame(payload in payload_strategy()) {
                let encoded = encode(&Message::json(payload.clone())).unwrap();
                let prefix = u32::from_le_bytes(encoded[..4].try_into().unwrap()) as usize;

                prop_assert_eq!(prefix, payload.len() + 1);
                prop_assert_eq!(encoded.len(), payload.len() + 5);
            }

            /// Property: Truncating a frame anywhere inside the body marks it incomplete
            #[test]
            fn prop_truncated_body_incomplete(
                payload in prop::collection::vec(any::<u8>(), 1..=4096),
                cut_ratio in 0.0f64..1.0,
            ) {
                let encoded = encode(&Message::json(payload.clone())).unwrap();
                let body_len = payload.len() + 1;
                let keep = 1 + ((body_len - 1) as f64 * cut_ratio) as usize;
                prop_assume!(keep < body_len);

                let decoded = decode(&encoded[..LENGTH_PREFIX_SIZE + keep]).unwrap();
                prop_assert!(!decoded.data_complete());
                prop_assert_eq!(decoded.data().as_ref(), &payload[..keep - 1]);
            }

            /// Property: Chunked delivery over a stream reconstructs the same frame
            #[test]
            fn prop_stream_chunking_roundtrip(
                payload in prop::collection::vec(any::<u8>(), 0..=2048),
                chunk in 1usize..64,
            ) {
                let original = Message::json(payload);
                let encoded = encode(&original).unwrap();
                let steps = encoded.chunks(chunk).map(|c| Step::Data(c.to_vec())).collect();
                let source = ScriptedSource::new(steps);

                let decoded = read_frame(&source, None, None).unwrap();
                prop_assert_eq!(decoded, original);
            }
        }
    }
}
