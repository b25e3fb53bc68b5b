//! The binary relay wire format: a 9-byte little-endian header followed by
//! an opaque payload. One agent connection carries many logical sessions
//! (channels) multiplexed over a single byte stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// `type(1) + length(2) + channel(2) + request_id(4)`.
pub const HEADER_LEN: usize = 9;

/// Frames larger than this are rejected by the decoder.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Channel 0 is reserved for control messages.
pub const CONTROL_CHANNEL: u16 = 0;

/// Frozen relay message type codes (§4.A).
pub mod message_type {
    pub const AUTH_REQUEST: u8 = 0x01;
    pub const AUTH_RESPONSE: u8 = 0x02;
    pub const HEARTBEAT: u8 = 0x03;
    pub const HEARTBEAT_ACK: u8 = 0x04;
    pub const AGENT_INFO: u8 = 0x05;
    pub const COMMAND_RESULT: u8 = 0x07;
    pub const TELEMETRY_DATA: u8 = 0x41;

    pub const DESKTOP_OPEN: u8 = 0x10;
    pub const DESKTOP_FRAME: u8 = 0x11;
    pub const DESKTOP_INPUT: u8 = 0x12;
    pub const DESKTOP_CONFIG: u8 = 0x13;
    pub const DESKTOP_CLOSE: u8 = 0x14;
    pub const DESKTOP_ACK: u8 = 0x15;

    pub const TERMINAL_OPEN: u8 = 0x20;
    pub const TERMINAL_DATA: u8 = 0x21;
    pub const TERMINAL_RESIZE: u8 = 0x22;
    pub const TERMINAL_CLOSE: u8 = 0x23;

    pub const FILE_LIST_REQUEST: u8 = 0x30;
    pub const FILE_LIST_RESPONSE: u8 = 0x31;
    pub const FILE_DOWNLOAD_REQUEST: u8 = 0x32;
    pub const FILE_DOWNLOAD_DATA: u8 = 0x33;
    pub const FILE_UPLOAD_REQUEST: u8 = 0x34;
    pub const FILE_UPLOAD_DATA: u8 = 0x35;
    pub const FILE_DELETE: u8 = 0x36;
    pub const FILE_ERROR: u8 = 0x37;
    pub const FILE_CLOSE: u8 = 0x38;

    /// Control messages must travel on channel 0.
    pub fn is_control(message_type: u8) -> bool {
        matches!(
            message_type,
            AUTH_REQUEST
                | AUTH_RESPONSE
                | HEARTBEAT
                | HEARTBEAT_ACK
                | AGENT_INFO
                | COMMAND_RESULT
                | TELEMETRY_DATA
        )
    }

    /// Media payloads are forwarded as opaque bytes rather than JSON.
    pub fn is_binary_payload(message_type: u8) -> bool {
        matches!(
            message_type,
            DESKTOP_FRAME | FILE_DOWNLOAD_DATA | TERMINAL_DATA | FILE_UPLOAD_DATA
        )
    }
}

/// One decoded `(header, payload)` unit of the relay protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u8,
    pub channel: u16,
    pub request_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: u8, channel: u16, request_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            channel,
            request_id,
            payload: payload.into(),
        }
    }

    /// Build a control-channel frame (channel forced to 0).
    pub fn control(message_type: u8, request_id: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(message_type, CONTROL_CHANNEL, request_id, payload)
    }

    /// Build a control-channel frame with a JSON-serialized payload.
    pub fn control_json(
        message_type: u8,
        request_id: u32,
        value: &impl serde::Serialize,
    ) -> Result<Self, FrameError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::control(message_type, request_id, bytes))
    }

    /// Build a session frame with a JSON-serialized payload.
    pub fn session_json(
        message_type: u8,
        channel: u16,
        request_id: u32,
        value: &impl serde::Serialize,
    ) -> Result<Self, FrameError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(message_type, channel, request_id, bytes))
    }

    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FrameError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload of {len} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { len: usize, limit: usize },
    #[error("frame payload does not fit the 16-bit length field ({0} bytes)")]
    PayloadOverflowsLengthField(usize),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stateless `tokio_util` codec for the relay wire format.
///
/// Buffers partial frames across reads and never splits a header across two
/// writes. A payload whose declared length exceeds `max_payload` is a fatal
/// decode error — callers should close the connection, not just drop the frame.
pub struct RelayCodec {
    max_payload: usize,
}

impl RelayCodec {
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let message_type = src[0];
        let length = u16::from_le_bytes([src[1], src[2]]) as usize;
        let channel = u16::from_le_bytes([src[3], src[4]]);
        let request_id = u32::from_le_bytes([src[5], src[6], src[7], src[8]]);

        if length > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                len: length,
                limit: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length).freeze();

        Ok(Some(Frame {
            message_type,
            channel,
            request_id,
            payload,
        }))
    }
}

impl Encoder<Frame> for RelayCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = frame.payload.len();
        let length: u16 = len
            .try_into()
            .map_err(|_| FrameError::PayloadOverflowsLengthField(len))?;

        dst.reserve(HEADER_LEN + len);
        dst.put_u8(frame.message_type);
        dst.put_slice(&length.to_le_bytes());
        dst.put_slice(&frame.channel.to_le_bytes());
        dst.put_slice(&frame.request_id.to_le_bytes());
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let mut codec = RelayCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn encodes_a_9_byte_header() {
        let frame = Frame::new(message_type::HEARTBEAT, 0, 7, Bytes::new());
        let mut codec = RelayCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(buf[0], message_type::HEARTBEAT);
        assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), 0);
        assert_eq!(u16::from_le_bytes([buf[3], buf[4]]), 0);
        assert_eq!(u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]), 7);
    }

    #[test]
    fn roundtrips_arbitrary_small_payloads() {
        for payload in [
            Bytes::new(),
            Bytes::from_static(b"x"),
            Bytes::from(vec![0u8; 4096]),
            Bytes::from(b"{\"hello\":\"world\"}".to_vec()),
        ] {
            let original = Frame::new(message_type::DESKTOP_FRAME, 42, 9001, payload);
            let decoded = roundtrip(original.clone());
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn buffers_partial_frames_across_reads() {
        let frame = Frame::new(message_type::TERMINAL_DATA, 3, 1, Bytes::from_static(b"abcdef"));
        let mut codec = RelayCodec::new();
        let mut full = BytesMut::new();
        codec.encode(frame.clone(), &mut full).unwrap();

        // Feed the codec one byte at a time; it must not emit a frame early
        // and must emit exactly one once the final byte arrives.
        let mut src = BytesMut::new();
        let mut emitted = None;
        for i in 0..full.len() {
            src.extend_from_slice(&[full[i]]);
            let result = codec.decode(&mut src).unwrap();
            if i + 1 < full.len() {
                assert!(result.is_none(), "must not decode a partial frame");
            } else {
                emitted = result;
            }
        }
        assert_eq!(emitted, Some(frame));
    }

    #[test]
    fn never_splits_a_header_across_two_encoded_frames() {
        let mut codec = RelayCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::new(1, 0, 1, Bytes::from_static(b"a")), &mut buf)
            .unwrap();
        codec
            .encode(Frame::new(2, 0, 2, Bytes::from_static(b"bb")), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.message_type, 1);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.message_type, 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_a_payload_beyond_the_configured_limit() {
        let mut codec = RelayCodec::with_max_payload(4);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x10, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { len: 5, limit: 4 }));
    }

    #[test]
    fn control_json_helper_forces_channel_zero() {
        let frame = Frame::control_json(message_type::AUTH_REQUEST, 0, &serde_json::json!({"a":1})).unwrap();
        assert_eq!(frame.channel, CONTROL_CHANNEL);
        assert_eq!(frame.message_type, message_type::AUTH_REQUEST);
    }

    #[test]
    fn is_control_partitions_message_types_correctly() {
        assert!(message_type::is_control(message_type::AUTH_REQUEST));
        assert!(message_type::is_control(message_type::TELEMETRY_DATA));
        assert!(!message_type::is_control(message_type::DESKTOP_OPEN));
        assert!(!message_type::is_control(message_type::FILE_CLOSE));
    }
}
