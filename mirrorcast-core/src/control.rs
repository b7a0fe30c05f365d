//! Input control channel.
//!
//! A second TCP link, separate from the video stream, that carries touch
//! and key input from the viewer back to the device. Every event is one
//! fixed-size packet:
//!
//! ```text
//! magic: u32  (big-endian, 0x41444253 "ADBS")
//! type:  u8   (1..=7, see ControlKind)
//! x:     u16  (big-endian)
//! y:     u16  (big-endian)
//! data:  u16  (big-endian, key code or scroll delta)
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MirrorError;

// ── Constants ────────────────────────────────────────────────────

/// Leading magic of every control packet ("ADBS").
pub const CONTROL_MAGIC: u32 = 0x4144_4253;

/// Size of one control packet in bytes.
pub const CONTROL_PACKET_SIZE: usize = 11;

/// Port the device-side input daemon listens on.
pub const DEFAULT_CONTROL_PORT: u16 = 22222;

// ── ControlKind ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlKind {
    Key = 1,
    TouchDown = 2,
    TouchUp = 3,
    TouchMove = 4,
    Scroll = 5,
    Back = 6,
    Home = 7,
}

impl ControlKind {
    /// Whether the sender pushes this event out immediately. Touch moves
    /// arrive in bursts and ride along with the next flushed event.
    pub const fn flushes(self) -> bool {
        !matches!(self, ControlKind::TouchMove)
    }
}

impl TryFrom<u8> for ControlKind {
    type Error = MirrorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ControlKind::Key),
            2 => Ok(ControlKind::TouchDown),
            3 => Ok(ControlKind::TouchUp),
            4 => Ok(ControlKind::TouchMove),
            5 => Ok(ControlKind::Scroll),
            6 => Ok(ControlKind::Back),
            7 => Ok(ControlKind::Home),
            other => Err(MirrorError::UnknownVariant {
                type_name: "ControlKind",
                value: other as u64,
            }),
        }
    }
}

// ── ControlEvent ─────────────────────────────────────────────────

/// One input event in device screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    pub kind: ControlKind,
    pub x: u16,
    pub y: u16,
    /// Key code for [`ControlKind::Key`], wheel delta for
    /// [`ControlKind::Scroll`], zero otherwise.
    pub data: u16,
}

impl ControlEvent {
    fn at(kind: ControlKind, x: u16, y: u16) -> Self {
        Self {
            kind,
            x,
            y,
            data: 0,
        }
    }

    /// Press and release of an Android key code.
    pub fn key(code: u16) -> Self {
        Self {
            kind: ControlKind::Key,
            x: 0,
            y: 0,
            data: code,
        }
    }

    pub fn touch_down(x: u16, y: u16) -> Self {
        Self::at(ControlKind::TouchDown, x, y)
    }

    pub fn touch_up(x: u16, y: u16) -> Self {
        Self::at(ControlKind::TouchUp, x, y)
    }

    pub fn touch_move(x: u16, y: u16) -> Self {
        Self::at(ControlKind::TouchMove, x, y)
    }

    /// Wheel scroll at a point; the delta travels as its two's
    /// complement bit pattern.
    pub fn scroll(x: u16, y: u16, delta: i16) -> Self {
        Self {
            kind: ControlKind::Scroll,
            x,
            y,
            data: delta as u16,
        }
    }

    pub fn back() -> Self {
        Self::at(ControlKind::Back, 0, 0)
    }

    pub fn home() -> Self {
        Self::at(ControlKind::Home, 0, 0)
    }

    /// Signed wheel delta of a scroll event.
    pub fn scroll_delta(&self) -> i16 {
        self.data as i16
    }
}

// ── ControlCodec ─────────────────────────────────────────────────

/// Frames [`ControlEvent`]s as fixed 11-byte packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlCodec;

impl ControlCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ControlCodec {
    type Item = ControlEvent;
    type Error = MirrorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < CONTROL_PACKET_SIZE {
            src.reserve(CONTROL_PACKET_SIZE - src.len());
            return Ok(None);
        }

        let mut packet = src.split_to(CONTROL_PACKET_SIZE);
        let magic = packet.get_u32();
        if magic != CONTROL_MAGIC {
            return Err(MirrorError::BadMagic(magic));
        }
        let kind = ControlKind::try_from(packet.get_u8())?;

        Ok(Some(ControlEvent {
            kind,
            x: packet.get_u16(),
            y: packet.get_u16(),
            data: packet.get_u16(),
        }))
    }
}

impl Encoder<ControlEvent> for ControlCodec {
    type Error = MirrorError;

    fn encode(&mut self, item: ControlEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(CONTROL_PACKET_SIZE);
        dst.put_u32(CONTROL_MAGIC);
        dst.put_u8(item.kind as u8);
        dst.put_u16(item.x);
        dst.put_u16(item.y);
        dst.put_u16(item.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(event: ControlEvent) -> BytesMut {
        let mut buf = BytesMut::new();
        ControlCodec::new().encode(event, &mut buf).unwrap();
        buf
    }

    #[test]
    fn touch_packet_layout() {
        let buf = encoded(ControlEvent::touch_down(0x0102, 0x0304));
        assert_eq!(
            &buf[..],
            &[0x41, 0x44, 0x42, 0x53, 2, 0x01, 0x02, 0x03, 0x04, 0, 0]
        );
    }

    #[test]
    fn key_code_travels_in_data() {
        // KEYCODE_VOLUME_UP
        let buf = encoded(ControlEvent::key(24));
        assert_eq!(buf.len(), CONTROL_PACKET_SIZE);
        assert_eq!(buf[4], 1);
        assert_eq!(&buf[5..9], &[0, 0, 0, 0]);
        assert_eq!(&buf[9..], &[0, 24]);
    }

    #[test]
    fn decodes_what_was_encoded() {
        let events = [
            ControlEvent::touch_down(10, 20),
            ControlEvent::touch_move(11, 22),
            ControlEvent::touch_up(12, 24),
            ControlEvent::scroll(300, 400, -120),
            ControlEvent::back(),
            ControlEvent::home(),
        ];
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();
        for event in events {
            codec.encode(event, &mut buf).unwrap();
        }

        let decoded: Vec<ControlEvent> =
            std::iter::from_fn(|| codec.decode(&mut buf).unwrap()).collect();
        assert_eq!(decoded, events);
        assert_eq!(decoded[3].scroll_delta(), -120);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_full_packet() {
        let full = encoded(ControlEvent::home());
        let mut partial = BytesMut::from(&full[..7]);
        assert!(ControlCodec::new().decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 7);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = encoded(ControlEvent::back());
        buf[0] = 0x55;
        assert!(matches!(
            ControlCodec::new().decode(&mut buf),
            Err(MirrorError::BadMagic(0x5544_4253))
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut buf = encoded(ControlEvent::back());
        buf[4] = 9;
        assert!(matches!(
            ControlCodec::new().decode(&mut buf),
            Err(MirrorError::UnknownVariant {
                type_name: "ControlKind",
                value: 9
            })
        ));
    }

    #[test]
    fn only_touch_move_is_deferred() {
        assert!(!ControlKind::TouchMove.flushes());
        for kind in [
            ControlKind::Key,
            ControlKind::TouchDown,
            ControlKind::TouchUp,
            ControlKind::Scroll,
            ControlKind::Back,
            ControlKind::Home,
        ] {
            assert!(kind.flushes(), "{kind:?} should flush");
        }
    }
}
