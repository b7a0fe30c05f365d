//! Scoped ownership of one encoder instance.
//!
//! [`EncoderGuard`] is the only way the pipeline touches a
//! [`VideoCodec`]. It enforces the configure → surface → start order and
//! releases the hardware when it goes out of scope, whether the session
//! ended cleanly, failed half-way through configuration, or panicked.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use super::{Capability, DrainResult, EncoderFormat, InputSurface, OutputBuffer, VideoCodec};
use crate::error::MirrorError;

/// Where the wrapped codec is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Configured,
    SurfaceCreated,
    Started,
    Released,
}

/// Owns a configured codec and tears it down on drop.
pub struct EncoderGuard {
    codec: Box<dyn VideoCodec>,
    format: EncoderFormat,
    state: CodecState,
    surface: Option<InputSurface>,
}

impl EncoderGuard {
    /// Take ownership of `codec` and configure it with the fixed AVC
    /// format.
    ///
    /// The guard exists before `configure` is called, so a codec that
    /// rejects its configuration is still released.
    pub fn configure(
        codec: Box<dyn VideoCodec>,
        width: u32,
        height: u32,
        bit_rate: u32,
    ) -> Result<Self, MirrorError> {
        let mut guard = Self {
            codec,
            format: EncoderFormat::avc(width, height, bit_rate),
            state: CodecState::Configured,
            surface: None,
        };

        guard.format.validate()?;

        match guard.codec.probe(Capability::InlineParameterSets) {
            Ok(()) => guard.format.inline_parameter_sets = true,
            Err(e) => debug!("{} unsupported, continuing without: {e}", Capability::InlineParameterSets),
        }

        let format = guard.format.clone();
        guard.codec.configure(&format)?;
        info!(
            "encoder configured: {}x{} @ {} bps, {} fps, {} profile",
            format.width,
            format.height,
            format.bit_rate,
            format.frame_rate,
            format.profile.caps_name()
        );

        Ok(guard)
    }

    pub fn format(&self) -> &EncoderFormat {
        &self.format
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Create the surface the display mirror renders into.
    pub fn create_input_surface(&mut self) -> Result<InputSurface, MirrorError> {
        if self.state != CodecState::Configured {
            return Err(MirrorError::InvalidState(
                "input surface must be created right after configure",
            ));
        }
        let surface = self.codec.create_input_surface()?;
        self.surface = Some(surface.clone());
        self.state = CodecState::SurfaceCreated;
        Ok(surface)
    }

    pub fn start(&mut self) -> Result<(), MirrorError> {
        if self.state != CodecState::SurfaceCreated {
            return Err(MirrorError::InvalidState(
                "encoder can only start once, after its surface exists",
            ));
        }
        self.codec.start()?;
        self.state = CodecState::Started;
        Ok(())
    }

    pub async fn dequeue(&mut self, timeout: Duration) -> Result<DrainResult, MirrorError> {
        if self.state != CodecState::Started {
            return Err(MirrorError::InvalidState("encoder is not running"));
        }
        self.codec.dequeue_output_buffer(timeout).await
    }

    pub fn payload(&mut self, buffer: &OutputBuffer) -> Result<Bytes, MirrorError> {
        self.codec.output_payload(buffer)
    }

    pub fn release_buffer(&mut self, index: usize) -> Result<(), MirrorError> {
        self.codec.release_output_buffer(index)
    }

    /// Stop and release the codec and its surface.
    ///
    /// Every step runs even if an earlier one failed; failures are
    /// logged and dropped. Calling this more than once is a no-op.
    pub fn teardown(&mut self) {
        if self.state == CodecState::Released {
            return;
        }

        if self.state == CodecState::Started {
            if let Err(e) = self.codec.stop() {
                debug!("encoder stop failed during teardown: {e}");
            }
        }
        if let Err(e) = self.codec.release() {
            debug!("encoder release failed during teardown: {e}");
        }
        if self.surface.take().is_some() {
            if let Err(e) = self.codec.release_input_surface() {
                debug!("input surface release failed during teardown: {e}");
            }
        }

        self.state = CodecState::Released;
        debug!("encoder released");
    }
}

impl Drop for EncoderGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
