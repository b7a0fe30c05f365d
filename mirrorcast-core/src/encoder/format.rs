//! The one fixed encoder configuration the pipeline uses.

use std::time::Duration;

use crate::error::MirrorError;

/// MIME type of the only codec the pipeline drives.
pub const MIME_AVC: &str = "video/avc";

/// Output frame rate, fixed.
pub const FRAME_RATE: u32 = 60;

/// Distance between forced keyframes, fixed.
pub const I_FRAME_INTERVAL: Duration = Duration::from_secs(1);

// ── Profile / level ──────────────────────────────────────────────

/// H.264 profile. Only baseline is ever requested, for maximal
/// decoder compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcProfile {
    Baseline,
}

impl AvcProfile {
    /// Name used in GStreamer caps.
    pub const fn caps_name(self) -> &'static str {
        match self {
            AvcProfile::Baseline => "baseline",
        }
    }
}

/// H.264 level. Level 1 is the lowest defined level; encoders raise it
/// to whatever the resolution and bit rate actually need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcLevel {
    Level1,
}

/// Where the encoder takes its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// Opaque, surface-backed input; frames are never handed over
    /// as CPU buffers.
    Surface,
}

// ── Capability ───────────────────────────────────────────────────

/// Optional encoder settings that may be missing on some platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Repeat SPS/PPS in front of every IDR frame so a viewer joining
    /// mid-stream can start decoding at the next keyframe.
    InlineParameterSets,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::InlineParameterSets => write!(f, "inline parameter sets"),
        }
    }
}

// ── EncoderFormat ────────────────────────────────────────────────

/// Full configuration handed to [`VideoCodec::configure`](super::VideoCodec::configure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub i_frame_interval: Duration,
    pub profile: AvcProfile,
    pub level: AvcLevel,
    pub color_format: ColorFormat,
    /// Re-emit the previous frame when the surface has been idle this
    /// long, so a static screen does not stall the stream.
    pub repeat_previous_frame_after: Duration,
    /// Set once the codec confirmed it can inline SPS/PPS.
    pub inline_parameter_sets: bool,
}

impl EncoderFormat {
    /// Build the fixed baseline AVC configuration for a target size and
    /// bit rate.
    pub fn avc(width: u32, height: u32, bit_rate: u32) -> Self {
        Self {
            mime: MIME_AVC,
            width,
            height,
            bit_rate,
            frame_rate: FRAME_RATE,
            i_frame_interval: I_FRAME_INTERVAL,
            profile: AvcProfile::Baseline,
            level: AvcLevel::Level1,
            color_format: ColorFormat::Surface,
            repeat_previous_frame_after: Duration::from_micros(1_000_000 / FRAME_RATE as u64),
            inline_parameter_sets: false,
        }
    }

    /// Reject configurations no encoder could accept.
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.width == 0 || self.height == 0 {
            return Err(MirrorError::Configure(format!(
                "invalid size {}x{}",
                self.width, self.height
            )));
        }
        if self.bit_rate == 0 {
            return Err(MirrorError::Configure("bit rate must be non-zero".into()));
        }
        Ok(())
    }

    /// Frame duration at the configured rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.frame_rate as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avc_format_uses_fixed_settings() {
        let fmt = EncoderFormat::avc(720, 1280, 4_000_000);
        assert_eq!(fmt.mime, "video/avc");
        assert_eq!(fmt.frame_rate, 60);
        assert_eq!(fmt.i_frame_interval, Duration::from_secs(1));
        assert_eq!(fmt.profile, AvcProfile::Baseline);
        assert_eq!(fmt.level, AvcLevel::Level1);
        assert_eq!(fmt.color_format, ColorFormat::Surface);
        assert!(!fmt.inline_parameter_sets);
    }

    #[test]
    fn repeat_timeout_is_one_frame() {
        let fmt = EncoderFormat::avc(720, 1280, 4_000_000);
        assert_eq!(fmt.repeat_previous_frame_after, Duration::from_micros(16_666));
        assert_eq!(fmt.repeat_previous_frame_after, fmt.frame_interval());
    }

    #[test]
    fn validate_rejects_degenerate_formats() {
        assert!(EncoderFormat::avc(0, 1280, 4_000_000).validate().is_err());
        assert!(EncoderFormat::avc(720, 1280, 0).validate().is_err());
        assert!(EncoderFormat::avc(720, 1280, 1).validate().is_ok());
    }
}
