//! `tokio_util` codec for length-prefixed wire frames.
//!
//! The encoder half is used by the server's [`FrameWriter`](crate::writer::FrameWriter);
//! the decoder half by receivers and tests.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MirrorError;
use crate::frame::{AccessUnit, FrameType, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};

/// Frames [`AccessUnit`]s as `tag | i32 length (BE) | payload`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Override the largest payload the decoder accepts.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max.min(MAX_PAYLOAD_SIZE);
        self
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = AccessUnit;
    type Error = MirrorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let tag = src[0];
        let length = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if length < 0 {
            return Err(MirrorError::NegativeLength(length));
        }
        let length = length as usize;
        if length > self.max_frame_size {
            return Err(MirrorError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();
        Ok(Some(AccessUnit {
            kind: FrameType::from(tag),
            payload,
        }))
    }
}

impl Encoder<AccessUnit> for FrameCodec {
    type Error = MirrorError;

    fn encode(&mut self, item: AccessUnit, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.is_empty() {
            return Err(MirrorError::EmptyPayload);
        }
        if item.len() > MAX_PAYLOAD_SIZE {
            return Err(MirrorError::PayloadTooLarge {
                size: item.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let tag = u8::try_from(item.kind)?;

        dst.reserve(item.wire_len());
        dst.put_u8(tag);
        dst.put_i32(item.len() as i32);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(unit: AccessUnit) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(unit, &mut buf).unwrap();
        buf
    }

    #[test]
    fn header_is_tag_then_big_endian_length() {
        let buf = encoded(AccessUnit::video(vec![0xAA; 1200]));
        assert_eq!(buf.len(), 1205);
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[1..5], &1200i32.to_be_bytes());
        assert!(buf[5..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn decode_reconstructs_payload_exactly() {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut buf = encoded(AccessUnit::video(payload.clone()));

        let unit = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(unit.kind, FrameType::Video);
        assert_eq!(&unit.payload[..], &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let full = encoded(AccessUnit::video(vec![7u8; 50]));
        let mut codec = FrameCodec::new();

        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..30]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 30);
    }

    #[test]
    fn decode_consecutive_frames_in_order() {
        let mut buf = BytesMut::new();
        let mut codec = FrameCodec::new();
        for size in [1200usize, 50, 3000] {
            codec
                .encode(AccessUnit::video(vec![size as u8; size]), &mut buf)
                .unwrap();
        }

        let sizes: Vec<usize> = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .map(|u| u.len())
            .collect();
        assert_eq!(sizes, vec![1200, 50, 3000]);
    }

    #[test]
    fn unknown_tag_decodes_as_unknown() {
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        buf.put_i32(2);
        buf.extend_from_slice(b"hi");

        let unit = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(unit.kind, FrameType::Unknown(9));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let mut buf = BytesMut::new();
        let err = FrameCodec::new()
            .encode(AccessUnit::video(Vec::new()), &mut buf)
            .unwrap_err();
        assert!(matches!(err, MirrorError::EmptyPayload));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_and_negative_lengths_are_rejected() {
        let mut codec = FrameCodec::new().with_max_frame_size(100);

        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_i32(101);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(MirrorError::FrameTooLarge { size: 101, max: 100 })
        ));

        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_i32(-1);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(MirrorError::NegativeLength(-1))
        ));
    }
}
