//! Hardware video encoder abstraction.
//!
//! [`VideoCodec`] mirrors the lifecycle of a platform encoder:
//! configure, create an input surface, start, drain output buffers,
//! then stop and release. Callers never drive it directly; they go
//! through [`EncoderGuard`], which enforces the call order and releases
//! the hardware on every exit path.
//!
//! ```text
//! configure ──► create_input_surface ──► start ──► dequeue/release ... ──► stop ──► release
//! ```

pub mod format;
pub mod guard;

use std::time::Duration;

use async_trait::async_trait;
use bitflags::bitflags;
use bytes::Bytes;

use crate::error::MirrorError;

pub use format::{AvcLevel, AvcProfile, Capability, ColorFormat, EncoderFormat};
pub use guard::EncoderGuard;

// ── Output buffers ───────────────────────────────────────────────

bitflags! {
    /// Flags attached to a drained output buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferFlags: u32 {
        /// The buffer holds an IDR frame.
        const KEY_FRAME     = 0x1;
        /// The buffer holds SPS/PPS rather than picture data.
        const CODEC_CONFIG  = 0x2;
        /// The encoder will not produce anything after this buffer.
        const END_OF_STREAM = 0x4;
    }
}

/// Descriptor of one dequeued output buffer.
///
/// The payload lives in the codec until the buffer is handed back via
/// [`VideoCodec::release_output_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBuffer {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub flags: BufferFlags,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
}

/// Output format reported after a format change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    /// Codec-specific data (SPS, PPS) if the encoder exposes it.
    pub parameter_sets: Vec<Bytes>,
}

/// Result of one bounded poll for encoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    /// A buffer is ready; it must be released exactly once.
    Buffer(OutputBuffer),
    /// Nothing arrived within the timeout; poll again.
    TryAgain,
    /// The output format changed. Carries no payload for the wire.
    FormatChanged(OutputFormat),
}

// ── InputSurface ─────────────────────────────────────────────────

/// Handle to the encoder-owned surface the display is rendered into.
///
/// The handle is a descriptor; the underlying resource stays owned by
/// the codec and is freed with [`VideoCodec::release_input_surface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSurface {
    /// Backend-specific name the display mirror uses to find the surface.
    pub name: String,
    pub width: u32,
    pub height: u32,
}

// ── VideoCodec ───────────────────────────────────────────────────

/// A platform video encoder.
///
/// Only `dequeue_output_buffer` suspends; everything else is expected
/// to return promptly. Teardown methods are synchronous so they can run
/// from `Drop`.
#[async_trait]
pub trait VideoCodec: Send {
    /// Check whether an optional setting is supported. The result is
    /// only ever logged.
    fn probe(&mut self, capability: Capability) -> Result<(), MirrorError>;

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), MirrorError>;

    fn create_input_surface(&mut self) -> Result<InputSurface, MirrorError>;

    fn start(&mut self) -> Result<(), MirrorError>;

    /// Wait up to `timeout` for one output buffer.
    async fn dequeue_output_buffer(&mut self, timeout: Duration)
    -> Result<DrainResult, MirrorError>;

    /// Copy out the `offset..offset + size` window of a dequeued buffer.
    fn output_payload(&mut self, buffer: &OutputBuffer) -> Result<Bytes, MirrorError>;

    fn release_output_buffer(&mut self, index: usize) -> Result<(), MirrorError>;

    fn stop(&mut self) -> Result<(), MirrorError>;

    fn release(&mut self) -> Result<(), MirrorError>;

    fn release_input_surface(&mut self) -> Result<(), MirrorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_flags_match_platform_values() {
        assert_eq!(BufferFlags::KEY_FRAME.bits(), 1);
        assert_eq!(BufferFlags::CODEC_CONFIG.bits(), 2);
        assert_eq!(BufferFlags::END_OF_STREAM.bits(), 4);
        let both = BufferFlags::KEY_FRAME | BufferFlags::CODEC_CONFIG;
        assert!(both.contains(BufferFlags::KEY_FRAME));
        assert!(!both.contains(BufferFlags::END_OF_STREAM));
    }
}
