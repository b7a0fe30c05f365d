//! One client connection's worth of streaming.
//!
//! A [`StreamSession`] configures a fresh encoder, binds its input
//! surface to the display mirror, starts it, and drains access units to
//! the client until it is cancelled, the client goes away, or something
//! fails. Whatever the exit path, the display binding and the encoder are
//! released before [`StreamSession::run`] returns, and only then is the
//! [`SessionPermit`] given back.

pub mod phase;
pub mod slot;

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::encoder::{BufferFlags, DrainResult, EncoderGuard, OutputBuffer, VideoCodec};
use crate::error::MirrorError;
use crate::frame::AccessUnit;
use crate::mirror::{DisplayMirror, MirrorBinding};
use crate::writer::FrameWriter;

pub use phase::SessionPhase;
pub use slot::{SessionPermit, SessionSlot};

/// Default bound on a single encoder poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

// ── SessionConfig ────────────────────────────────────────────────

/// Per-session encoder and mirroring parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    /// Upper bound on one encoder poll; also bounds how long a
    /// cancellation can go unnoticed.
    pub poll_timeout: Duration,
    /// Name given to the virtual display.
    pub display_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            bit_rate: 4_000_000,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            display_name: "mirrorcast".into(),
        }
    }
}

// ── SessionReport ────────────────────────────────────────────────

/// Why a session stopped streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The cancellation token fired.
    Cancelled,
    /// The client closed or reset the connection.
    Disconnected,
    /// The encoder flagged its last buffer.
    EndOfStream,
}

/// Counters for one finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub id: u64,
    pub exit: SessionExit,
    pub frames_written: u64,
    /// Bytes put on the wire, headers included.
    pub bytes_written: u64,
    pub buffers_released: u64,
    pub empty_buffers: u64,
    pub format_changes: u64,
}

#[derive(Debug, Default)]
struct DrainStats {
    buffers_released: u64,
    empty_buffers: u64,
    format_changes: u64,
}

/// Session-scoped hardware. Dropping it releases everything, mirror
/// first so nothing renders into a surface that is going away.
#[derive(Default)]
struct SessionResources {
    mirror: Option<MirrorBinding>,
    encoder: Option<EncoderGuard>,
}

impl SessionResources {
    fn release(&mut self) {
        if let Some(mut mirror) = self.mirror.take() {
            mirror.release();
        }
        if let Some(mut encoder) = self.encoder.take() {
            encoder.teardown();
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

// ── StreamSession ────────────────────────────────────────────────

/// A single streaming session. Never reused across connections.
pub struct StreamSession {
    id: u64,
    config: SessionConfig,
    phase: SessionPhase,
    permit: SessionPermit,
}

impl StreamSession {
    /// Create a session. The permit proves no other session owns the
    /// encoder.
    pub fn new(id: u64, config: SessionConfig, permit: SessionPermit) -> Self {
        Self {
            id,
            config,
            phase: SessionPhase::Created,
            permit,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Run the session to completion.
    ///
    /// Client disconnects end the session normally with
    /// [`SessionExit::Disconnected`]; every other failure is returned as
    /// an error. Either way the encoder and the display binding have been
    /// released when this returns.
    pub async fn run<W>(
        mut self,
        codec: Box<dyn VideoCodec>,
        mirror: Box<dyn DisplayMirror>,
        sink: W,
        cancel: CancellationToken,
    ) -> Result<SessionReport, MirrorError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut resources = SessionResources::default();
        let mut writer = FrameWriter::new(sink);
        let mut stats = DrainStats::default();

        let outcome = self
            .drive(&mut resources, codec, mirror, &mut writer, &cancel, &mut stats)
            .await;

        self.transition(SessionPhase::cleanup);
        resources.release();
        self.transition(SessionPhase::terminated);
        drop(self.permit);

        let exit = match outcome {
            Ok(exit) => exit,
            Err(e) if e.is_disconnect() => SessionExit::Disconnected,
            Err(e) => return Err(e),
        };

        let report = SessionReport {
            id: self.id,
            exit,
            frames_written: writer.frames_written(),
            bytes_written: writer.bytes_written(),
            buffers_released: stats.buffers_released,
            empty_buffers: stats.empty_buffers,
            format_changes: stats.format_changes,
        };
        info!(
            "session {} ended ({:?}): {} frames, {} bytes",
            self.id, report.exit, report.frames_written, report.bytes_written
        );
        Ok(report)
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn drive<W>(
        &mut self,
        resources: &mut SessionResources,
        codec: Box<dyn VideoCodec>,
        mirror: Box<dyn DisplayMirror>,
        writer: &mut FrameWriter<W>,
        cancel: &CancellationToken,
        stats: &mut DrainStats,
    ) -> Result<SessionExit, MirrorError>
    where
        W: AsyncWrite + Unpin,
    {
        let cfg = &self.config;
        let encoder = resources.encoder.insert(EncoderGuard::configure(
            codec,
            cfg.width,
            cfg.height,
            cfg.bit_rate,
        )?);
        self.phase.configured()?;

        let surface = encoder.create_input_surface()?;
        resources.mirror = Some(MirrorBinding::bind(mirror, &surface, &cfg.display_name)?);
        self.phase.surface_bound()?;

        encoder.start()?;
        self.phase.running()?;
        info!("session {} streaming", self.id);

        loop {
            if cancel.is_cancelled() {
                debug!("session {} cancelled", self.id);
                return Ok(SessionExit::Cancelled);
            }

            match encoder.dequeue(cfg.poll_timeout).await? {
                DrainResult::TryAgain => {}
                DrainResult::FormatChanged(format) => {
                    stats.format_changes += 1;
                    debug!(
                        "output format changed: {}x{}, {} parameter set(s)",
                        format.width,
                        format.height,
                        format.parameter_sets.len()
                    );
                }
                DrainResult::Buffer(buffer) => {
                    let forwarded = Self::forward(encoder, writer, &buffer).await;
                    let released = encoder.release_buffer(buffer.index);
                    stats.buffers_released += 1;

                    if !forwarded? {
                        stats.empty_buffers += 1;
                    }
                    released?;

                    if buffer.flags.contains(BufferFlags::END_OF_STREAM) {
                        debug!("session {} reached end of stream", self.id);
                        return Ok(SessionExit::EndOfStream);
                    }
                }
            }
        }
    }

    /// Write the buffer's payload if it has one. Returns whether a frame
    /// went out.
    async fn forward<W>(
        encoder: &mut EncoderGuard,
        writer: &mut FrameWriter<W>,
        buffer: &OutputBuffer,
    ) -> Result<bool, MirrorError>
    where
        W: AsyncWrite + Unpin,
    {
        if buffer.size == 0 {
            trace!("buffer {} is empty, skipping", buffer.index);
            return Ok(false);
        }
        let payload = encoder.payload(buffer)?;
        if payload.is_empty() {
            return Ok(false);
        }
        writer.write(AccessUnit::video(payload)).await?;
        Ok(true)
    }

    /// Apply a cleanup-path transition, logging instead of failing.
    fn transition(&mut self, step: fn(&mut SessionPhase) -> Result<(), MirrorError>) {
        if let Err(e) = step(&mut self.phase) {
            debug!("session {}: {e}", self.id);
        }
        debug!("session {} -> {}", self.id, self.phase);
    }
}
