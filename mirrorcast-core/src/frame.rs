//! Access units and their wire representation.
//!
//! ## Wire format
//!
//! ```text
//! type:    u8   (1 = video access unit)
//! length:  i32  (big-endian, payload byte count)
//! payload: [u8] (exactly `length` bytes)
//! ```
//!
//! There is no handshake and no acknowledgement channel; the server
//! pushes frames after TCP connect until one side goes away.

use bytes::Bytes;

use crate::error::MirrorError;

// ── Constants ────────────────────────────────────────────────────

/// Size of the tag + length prefix in bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the 32-bit signed length field can announce.
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize;

/// Largest frame a receiver accepts before treating the stream as
/// corrupt (16 MiB, far above any baseline access unit).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// ── FrameType ────────────────────────────────────────────────────

/// Type tag carried in the first byte of every wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Compressed H.264 access unit.
    Video,
    /// Any tag this build does not understand. Receivers skip these.
    Unknown(u8),
}

impl FrameType {
    pub const VIDEO_TAG: u8 = 0x01;

    pub const fn as_byte(self) -> u8 {
        match self {
            FrameType::Video => Self::VIDEO_TAG,
            FrameType::Unknown(tag) => tag,
        }
    }
}

impl From<u8> for FrameType {
    fn from(tag: u8) -> Self {
        match tag {
            Self::VIDEO_TAG => FrameType::Video,
            other => FrameType::Unknown(other),
        }
    }
}

impl TryFrom<FrameType> for u8 {
    type Error = MirrorError;

    /// Only known tags may be put on the wire by this crate.
    fn try_from(kind: FrameType) -> Result<Self, Self::Error> {
        match kind {
            FrameType::Video => Ok(FrameType::VIDEO_TAG),
            FrameType::Unknown(tag) => Err(MirrorError::UnknownVariant {
                type_name: "FrameType",
                value: tag as u64,
            }),
        }
    }
}

// ── AccessUnit ───────────────────────────────────────────────────

/// One unit of encoder output, in encoder emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub kind: FrameType,
    pub payload: Bytes,
}

impl AccessUnit {
    /// Wrap a compressed video payload.
    pub fn video(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameType::Video,
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes this unit occupies once framed.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}
