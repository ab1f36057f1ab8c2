//! Length-prefixed frame codec for the two wire dialects
//!
//! Every hop in the pipeline exchanges JSON payloads behind a 4-byte length
//! prefix, but the two links disagree on the details:
//!
//! - **IPC dialect** (broker socket): big-endian length, 64 MiB cap.
//! - **Native dialect** (relay stdio, per the browser's native-messaging
//!   protocol): little-endian length, 1 MiB cap.
//!
//! [`FrameCodec`] implements both [`tokio_util::codec::Encoder`] and
//! [`tokio_util::codec::Decoder`] so it can drive a `Framed` stream, and it
//! also works standalone: [`FrameCodec::push`] accepts arbitrary byte chunks
//! and yields zero or more complete messages per call, carrying any trailing
//! partial frame over to the next call. [`FrameCodec::reset`] clears that
//! carry-over; it must be called when a connection is re-established.
//!
//! A declared length beyond the dialect cap fails fast with
//! [`AgentfoxError::FrameTooLarge`] before any payload bytes are consumed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{AgentfoxError, Result};

/// Cap for frames on the broker's stream socket.
pub const IPC_FRAME_LIMIT: usize = 64 * 1024 * 1024;

/// Cap for frames on the native-messaging stdio link.
pub const NATIVE_FRAME_LIMIT: usize = 1024 * 1024;

/// The two length-prefix dialects used across the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDialect {
    /// Big-endian length prefix, 64 MiB cap (broker socket).
    Ipc,
    /// Little-endian length prefix, 1 MiB cap (native messaging).
    Native,
}

impl FrameDialect {
    /// Maximum payload length this dialect accepts.
    pub fn limit(&self) -> usize {
        match self {
            FrameDialect::Ipc => IPC_FRAME_LIMIT,
            FrameDialect::Native => NATIVE_FRAME_LIMIT,
        }
    }

    fn read_len(&self, prefix: [u8; 4]) -> usize {
        match self {
            FrameDialect::Ipc => u32::from_be_bytes(prefix) as usize,
            FrameDialect::Native => u32::from_le_bytes(prefix) as usize,
        }
    }

    fn put_len(&self, dst: &mut BytesMut, len: u32) {
        match self {
            FrameDialect::Ipc => dst.put_u32(len),
            FrameDialect::Native => dst.put_u32_le(len),
        }
    }
}

/// Incremental, restartable codec for one frame dialect.
///
/// # Examples
///
/// ```
/// use agentfox::codec::{FrameCodec, FrameDialect};
/// use serde_json::json;
///
/// let mut codec = FrameCodec::new(FrameDialect::Ipc);
/// let bytes = codec.encode_frame(&json!({"type": "ping"})).unwrap();
/// let messages = codec.push(&bytes).unwrap();
/// assert_eq!(messages, vec![json!({"type": "ping"})]);
/// ```
#[derive(Debug)]
pub struct FrameCodec {
    dialect: FrameDialect,
    /// Carry-over buffer for the standalone `push` path.
    buf: BytesMut,
}

impl FrameCodec {
    /// Create a codec for the given dialect with an empty carry-over buffer.
    pub fn new(dialect: FrameDialect) -> Self {
        Self {
            dialect,
            buf: BytesMut::new(),
        }
    }

    /// The dialect this codec speaks.
    pub fn dialect(&self) -> FrameDialect {
        self.dialect
    }

    /// Encode one message as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::FrameTooLarge`] when the serialized payload
    /// exceeds the dialect cap, and [`AgentfoxError::Serialization`] when the
    /// value cannot be serialized.
    pub fn encode_frame(&self, message: &Value) -> Result<Bytes> {
        let payload = serde_json::to_vec(message).map_err(AgentfoxError::Serialization)?;
        if payload.len() > self.dialect.limit() {
            return Err(AgentfoxError::FrameTooLarge {
                size: payload.len(),
                limit: self.dialect.limit(),
            }
            .into());
        }
        let mut framed = BytesMut::with_capacity(4 + payload.len());
        self.dialect.put_len(&mut framed, payload.len() as u32);
        framed.put_slice(&payload);
        Ok(framed.freeze())
    }

    /// Feed a chunk of bytes and collect every complete message it finishes.
    ///
    /// Any trailing partial frame stays buffered for the next call, so the
    /// same total byte stream yields the same message sequence no matter how
    /// it is partitioned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::FrameTooLarge`] for an oversized declared
    /// length and [`AgentfoxError::Framing`] for an undecodable payload. The
    /// offending bytes are left unconsumed; the caller is expected to drop
    /// the connection and [`reset`](FrameCodec::reset) the codec.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Value>> {
        self.buf.extend_from_slice(chunk);
        let mut messages = Vec::new();
        loop {
            let mut scratch = std::mem::take(&mut self.buf);
            let decoded = self.decode(&mut scratch);
            self.buf = scratch;
            match decoded? {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        Ok(messages)
    }

    /// Drop any buffered partial frame.
    ///
    /// Required when a connection is re-established: bytes from the previous
    /// peer must not prefix the next peer's stream.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of bytes currently buffered, including any rejected prefix.
    ///
    /// Lets a tolerant caller that wants to skip an oversized frame compute
    /// how many raw bytes remain to be discarded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&src[..4]);
        let len = self.dialect.read_len(prefix);
        if len > self.dialect.limit() {
            return Err(AgentfoxError::FrameTooLarge {
                size: len,
                limit: self.dialect.limit(),
            }
            .into());
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let payload = src.split_to(len);
        let message = serde_json::from_slice(&payload)
            .map_err(|e| AgentfoxError::Framing(format!("invalid frame payload: {}", e)))?;
        Ok(Some(message))
    }
}

impl Encoder<&Value> for FrameCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: &Value, dst: &mut BytesMut) -> Result<()> {
        let framed = self.encode_frame(item)?;
        dst.extend_from_slice(&framed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Verifies that encoding then decoding yields the same structural value
    /// in both dialects.
    #[test]
    fn test_round_trip_both_dialects() {
        for dialect in [FrameDialect::Ipc, FrameDialect::Native] {
            let mut codec = FrameCodec::new(dialect);
            let message = json!({"id": "c1", "action": "navigate", "params": {"url": "https://example.com"}});
            let bytes = codec.encode_frame(&message).unwrap();
            let out = codec.push(&bytes).unwrap();
            assert_eq!(out, vec![message], "dialect {:?}", dialect);
        }
    }

    /// Verifies the IPC dialect writes a big-endian prefix and the native
    /// dialect a little-endian one.
    #[test]
    fn test_prefix_endianness() {
        let message = json!({});
        let ipc = FrameCodec::new(FrameDialect::Ipc)
            .encode_frame(&message)
            .unwrap();
        let native = FrameCodec::new(FrameDialect::Native)
            .encode_frame(&message)
            .unwrap();
        // payload is `{}` -> 2 bytes
        assert_eq!(&ipc[..4], &[0, 0, 0, 2]);
        assert_eq!(&native[..4], &[2, 0, 0, 0]);
    }

    /// Verifies that the same byte stream produces the same messages no
    /// matter how it is split into chunks.
    #[test]
    fn test_arbitrary_chunk_boundaries() {
        let mut codec = FrameCodec::new(FrameDialect::Ipc);
        let messages = vec![
            json!({"type": "ping"}),
            json!({"type": "response", "id": "c1", "success": true, "result": {}}),
            json!({"type": "pong"}),
        ];
        let mut stream = Vec::new();
        for m in &messages {
            stream.extend_from_slice(&codec.encode_frame(m).unwrap());
        }

        for chunk_size in [1, 2, 3, 5, 7, stream.len()] {
            codec.reset();
            let mut decoded = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoded.extend(codec.push(chunk).unwrap());
            }
            assert_eq!(decoded, messages, "chunk size {}", chunk_size);
        }
    }

    /// Verifies that a declared length beyond the cap raises a distinct
    /// error without consuming further data.
    #[test]
    fn test_oversized_declared_length_rejected() {
        let mut codec = FrameCodec::new(FrameDialect::Native);
        let mut bytes = BytesMut::new();
        bytes.put_u32_le((NATIVE_FRAME_LIMIT + 1) as u32);
        bytes.put_slice(b"xxxx");
        let err = codec.push(&bytes).unwrap_err();
        let err = err.downcast::<AgentfoxError>().unwrap();
        assert!(matches!(err, AgentfoxError::FrameTooLarge { .. }));
    }

    /// Verifies that an oversized payload is refused at encode time.
    #[test]
    fn test_oversized_payload_refused_on_encode() {
        let codec = FrameCodec::new(FrameDialect::Native);
        let message = json!({"data": "x".repeat(NATIVE_FRAME_LIMIT + 16)});
        let err = codec.encode_frame(&message).unwrap_err();
        assert!(matches!(
            err.downcast::<AgentfoxError>().unwrap(),
            AgentfoxError::FrameTooLarge { .. }
        ));
    }

    /// Verifies that a payload that is not valid JSON produces a framing
    /// error rather than a panic.
    #[test]
    fn test_invalid_payload_is_framing_error() {
        let mut codec = FrameCodec::new(FrameDialect::Ipc);
        let mut bytes = BytesMut::new();
        bytes.put_u32(3);
        bytes.put_slice(b"{{{");
        let err = codec.push(&bytes).unwrap_err();
        assert!(matches!(
            err.downcast::<AgentfoxError>().unwrap(),
            AgentfoxError::Framing(_)
        ));
    }

    /// Verifies that reset discards a buffered partial frame.
    #[test]
    fn test_reset_clears_partial_frame() {
        let mut codec = FrameCodec::new(FrameDialect::Ipc);
        let bytes = codec.encode_frame(&json!({"type": "ping"})).unwrap();
        // Feed only part of the frame, then reset as a reconnect would.
        assert!(codec.push(&bytes[..3]).unwrap().is_empty());
        codec.reset();
        // The full frame decodes cleanly after the reset.
        let out = codec.push(&bytes).unwrap();
        assert_eq!(out.len(), 1);
    }

    /// Verifies that several frames in one chunk all decode in order.
    #[test]
    fn test_multiple_frames_per_push() {
        let mut codec = FrameCodec::new(FrameDialect::Native);
        let a = codec.encode_frame(&json!({"n": 1})).unwrap();
        let b = codec.encode_frame(&json!({"n": 2})).unwrap();
        let mut stream = a.to_vec();
        stream.extend_from_slice(&b);
        let out = codec.push(&stream).unwrap();
        assert_eq!(out, vec![json!({"n": 1}), json!({"n": 2})]);
    }
}
