//! Writes access units to the client as wire frames, one flush per frame.

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tracing::trace;

use crate::codec::FrameCodec;
use crate::error::MirrorError;
use crate::frame::AccessUnit;

/// Frame writer over any async byte sink.
///
/// Every [`write`](Self::write) is flushed before it returns; frames are
/// never batched because the consumer is a live viewer.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, FrameCodec>,
    frames_written: u64,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: FramedWrite::new(sink, FrameCodec::new()),
            frames_written: 0,
            bytes_written: 0,
        }
    }

    /// Frame, write and flush one access unit.
    ///
    /// Empty units are rejected; the caller is expected to filter them.
    /// A socket failure ends the session and is not retried.
    pub async fn write(&mut self, unit: AccessUnit) -> Result<(), MirrorError> {
        if unit.is_empty() {
            return Err(MirrorError::EmptyPayload);
        }
        let wire_len = unit.wire_len() as u64;

        self.inner.send(unit).await.map_err(|e| match e {
            MirrorError::Connection(io) => MirrorError::from_write(io),
            other => other,
        })?;

        self.frames_written += 1;
        self.bytes_written += wire_len;
        trace!("frame {} written ({wire_len} bytes)", self.frames_written);
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Bytes put on the wire, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn wire(size: usize, fill: u8) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend_from_slice(&(size as i32).to_be_bytes());
        out.extend(std::iter::repeat_n(fill, size));
        out
    }

    #[tokio::test]
    async fn writes_one_frame_per_unit() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write(AccessUnit::video(vec![0xAA; 1200])).await.unwrap();
        writer.write(AccessUnit::video(vec![0xBB; 50])).await.unwrap();

        assert_eq!(writer.frames_written(), 2);
        assert_eq!(writer.bytes_written(), 1205 + 55);

        let mut expected = wire(1200, 0xAA);
        expected.extend(wire(50, 0xBB));
        assert_eq!(writer.into_inner(), expected);
    }

    #[tokio::test]
    async fn empty_unit_writes_nothing() {
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer.write(AccessUnit::video(Vec::new())).await.unwrap_err();
        assert!(matches!(err, MirrorError::EmptyPayload));
        assert_eq!(writer.frames_written(), 0);
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn broken_pipe_surfaces_as_disconnect() {
        let sink = tokio_test::io::Builder::new()
            .write(&wire(3, 0x11))
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut writer = FrameWriter::new(sink);

        writer.write(AccessUnit::video(vec![0x11; 3])).await.unwrap();
        let err = writer.write(AccessUnit::video(vec![0x22; 4])).await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(writer.frames_written(), 1);
    }
}
