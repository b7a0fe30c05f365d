//! Input sender for the device's control channel.
//!
//! Touch moves are queued and go out with the next flushed event;
//! everything else is written through immediately.

use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, trace};

use mirrorcast_core::{ControlCodec, ControlEvent, MirrorError};

pub struct ControlSender<W> {
    sink: FramedWrite<W, ControlCodec>,
    sent: u64,
}

impl ControlSender<TcpStream> {
    /// Connect to the input daemon at `address` (`host:port`).
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, MirrorError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                MirrorError::Connection(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "control connect timed out",
                ))
            })??;
        stream.set_nodelay(true)?;
        info!("control channel connected to {address}");
        Ok(Self::new(stream))
    }
}

impl<W> ControlSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            sink: FramedWrite::new(writer, ControlCodec::new()),
            sent: 0,
        }
    }

    /// Events handed to the sender so far, queued ones included.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn get_ref(&self) -> &W {
        self.sink.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    pub async fn send(&mut self, event: ControlEvent) -> Result<(), MirrorError> {
        if event.kind.flushes() {
            self.sink.send(event).await.map_err(disconnect)?;
            debug!("control {:?} at ({}, {})", event.kind, event.x, event.y);
        } else {
            self.sink.feed(event).await.map_err(disconnect)?;
            trace!("control {:?} queued", event.kind);
        }
        self.sent += 1;
        Ok(())
    }

    /// Push out any queued touch moves.
    pub async fn flush(&mut self) -> Result<(), MirrorError> {
        self.sink.flush().await.map_err(disconnect)
    }

    /// Tap at a point: touch down followed by touch up.
    pub async fn tap(&mut self, x: u16, y: u16) -> Result<(), MirrorError> {
        self.send(ControlEvent::touch_down(x, y)).await?;
        self.send(ControlEvent::touch_up(x, y)).await
    }
}

fn disconnect(e: MirrorError) -> MirrorError {
    match e {
        MirrorError::Connection(io) => MirrorError::from_write(io),
        other => other,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use mirrorcast_core::CONTROL_PACKET_SIZE;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    fn packet(kind: u8, x: u16, y: u16, data: u16) -> Vec<u8> {
        let mut buf = 0x4144_4253u32.to_be_bytes().to_vec();
        buf.push(kind);
        buf.extend_from_slice(&x.to_be_bytes());
        buf.extend_from_slice(&y.to_be_bytes());
        buf.extend_from_slice(&data.to_be_bytes());
        buf
    }

    #[tokio::test]
    async fn key_is_written_immediately() {
        let writer = tokio_test::io::Builder::new()
            .write(&packet(1, 0, 0, 4))
            .build();

        let mut sender = ControlSender::new(writer);
        sender.send(ControlEvent::key(4)).await.unwrap();
        assert_eq!(sender.sent(), 1);
    }

    #[tokio::test]
    async fn touch_moves_wait_for_next_flushed_event() {
        let mut sender = ControlSender::new(Vec::new());

        sender.send(ControlEvent::touch_move(5, 6)).await.unwrap();
        sender.send(ControlEvent::touch_move(7, 8)).await.unwrap();
        assert!(sender.get_ref().is_empty());

        sender.send(ControlEvent::touch_up(7, 8)).await.unwrap();
        let mut expected = packet(4, 5, 6, 0);
        expected.extend(packet(4, 7, 8, 0));
        expected.extend(packet(3, 7, 8, 0));
        assert_eq!(sender.into_inner(), expected);
    }

    #[tokio::test]
    async fn explicit_flush_sends_queued_moves() {
        let mut sender = ControlSender::new(Vec::new());
        sender.send(ControlEvent::touch_move(1, 2)).await.unwrap();
        sender.flush().await.unwrap();
        assert_eq!(sender.get_ref().len(), CONTROL_PACKET_SIZE);
    }

    #[tokio::test]
    async fn closed_peer_is_a_disconnect() {
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            .build();

        let mut sender = ControlSender::new(writer);
        let err = sender.send(ControlEvent::home()).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn tap_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let mut sender = ControlSender::connect(&address, Duration::from_secs(5))
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();
        sender.tap(360, 640).await.unwrap();

        let mut received = vec![0u8; 2 * CONTROL_PACKET_SIZE];
        peer.read_exact(&mut received).await.unwrap();
        let mut expected = packet(2, 360, 640, 0);
        expected.extend(packet(3, 360, 640, 0));
        assert_eq!(received, expected);
    }
}
