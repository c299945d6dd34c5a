//! Frame codec for control streams
//!
//! Messages are framed as a u32 big-endian length prefix followed by a
//! bincode-encoded [`EdgeMessage`] body.

use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::messages::EdgeMessage;
use crate::MAX_FRAME_SIZE;

/// Errors produced while encoding or decoding frames
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Length-prefixed bincode codec for [`EdgeMessage`]
pub struct EdgeCodec;

impl EdgeCodec {
    /// Encode a message into a framed byte vector
    pub fn encode(message: &EdgeMessage) -> Result<Vec<u8>, CodecError> {
        let body = bincode::serialize(message)?;

        if body.len() > MAX_FRAME_SIZE as usize {
            return Err(CodecError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE as usize,
            });
        }

        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Decode one message from the buffer, if a complete frame is available
    ///
    /// Returns `Ok(None)` when more bytes are needed. Consumed bytes are
    /// removed from the buffer.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<EdgeMessage>, CodecError> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE as usize {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE as usize,
            });
        }

        if buf.len() < 4 + len {
            return Ok(None);
        }

        buf.advance(4);
        let body = buf.split_to(len);
        let message = bincode::deserialize(&body)?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let msg = EdgeMessage::Ping { timestamp: 99 };
        let framed = EdgeCodec::encode(&msg).unwrap();

        let mut buf = BytesMut::from(&framed[..]);
        let decoded = EdgeCodec::decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(msg));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_frame() {
        let msg = EdgeMessage::Pong { timestamp: 7 };
        let framed = EdgeCodec::encode(&msg).unwrap();

        // Feed everything except the last byte
        let mut buf = BytesMut::from(&framed[..framed.len() - 1]);
        assert!(EdgeCodec::decode(&mut buf).unwrap().is_none());

        // Completing the frame makes it decodable
        buf.extend_from_slice(&framed[framed.len() - 1..]);
        let decoded = EdgeCodec::decode(&mut buf).unwrap();
        assert_eq!(decoded, Some(msg));
    }

    #[test]
    fn test_decode_two_frames_in_buffer() {
        let first = EdgeMessage::Ping { timestamp: 1 };
        let second = EdgeMessage::Pong { timestamp: 2 };

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&EdgeCodec::encode(&first).unwrap());
        buf.extend_from_slice(&EdgeCodec::encode(&second).unwrap());

        assert_eq!(EdgeCodec::decode(&mut buf).unwrap(), Some(first));
        assert_eq!(EdgeCodec::decode(&mut buf).unwrap(), Some(second));
        assert!(EdgeCodec::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_oversize_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        let result = EdgeCodec::decode(&mut buf);
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }
}
