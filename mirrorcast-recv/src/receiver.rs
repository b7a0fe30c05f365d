//! Reconnecting stream receiver.
//!
//! Connects to a mirrorcast server, decodes wire frames, and writes the
//! video payloads back to back, which yields a playable Annex-B H.264
//! stream. When the server goes away it waits the reconnect delay and
//! tries again until stopped.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use mirrorcast_core::{FrameCodec, FrameType, MirrorError};

use crate::config::RecvConfig;

/// Counters over the receiver's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    pub connections: u64,
    pub frames: u64,
    /// Payload bytes written to the output.
    pub bytes: u64,
    /// Frames with a type other than video.
    pub skipped: u64,
}

pub struct StreamReceiver<W> {
    address: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    output: W,
    stats: ReceiverStats,
    shutdown: CancellationToken,
}

impl<W> StreamReceiver<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(config: &RecvConfig, output: W) -> Self {
        Self {
            address: config.server_address(),
            connect_timeout: config.connect_timeout(),
            reconnect_delay: config.reconnect_delay(),
            output,
            stats: ReceiverStats::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the receiver.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Receive until stopped, reconnecting whenever the stream drops.
    ///
    /// Only output failures end the loop with an error; network failures
    /// are retried.
    pub async fn run(&mut self) -> Result<ReceiverStats, MirrorError> {
        while !self.shutdown.is_cancelled() {
            let connected = tokio::select! {
                result = self.connect() => result,
                _ = self.shutdown.cancelled() => break,
            };

            match connected {
                Ok(stream) => {
                    self.stats.connections += 1;
                    info!("connected to {}", self.address);
                    self.receive(stream).await?;
                }
                Err(e) => debug!("connecting to {} failed: {e}", self.address),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!(
            "receiver stopped: {} frames, {} bytes over {} connection(s)",
            self.stats.frames, self.stats.bytes, self.stats.connections
        );
        Ok(self.stats)
    }

    /// Copy video payloads from one connection to the output until the
    /// stream ends, breaks, or the receiver is stopped.
    pub async fn receive<R>(&mut self, reader: R) -> Result<(), MirrorError>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, FrameCodec::new());

        loop {
            let next = tokio::select! {
                next = frames.next() => next,
                _ = self.shutdown.cancelled() => return Ok(()),
            };

            let unit = match next {
                Some(Ok(unit)) => unit,
                Some(Err(e)) => {
                    warn!("stream from {} broken: {e}", self.address);
                    return Ok(());
                }
                None => {
                    info!("server closed the stream");
                    return Ok(());
                }
            };

            match unit.kind {
                FrameType::Video => {
                    self.output.write_all(&unit.payload).await?;
                    self.output.flush().await?;
                    self.stats.frames += 1;
                    self.stats.bytes += unit.len() as u64;
                    trace!("frame {}: {} bytes", self.stats.frames, unit.len());
                }
                FrameType::Unknown(tag) => {
                    self.stats.skipped += 1;
                    debug!("skipping frame with type {tag} ({} bytes)", unit.len());
                }
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream, MirrorError> {
        let connect = TcpStream::connect(self.address.as_str());
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                MirrorError::Connection(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

// ── Tests ────────────────────────────────────────────────────────
