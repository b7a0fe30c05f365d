//! GStreamer implementation of the encoder and the display mirror.
//!
//! The two halves meet through an `intervideosink`/`intervideosrc`
//! channel: the encoder pipeline reads from the channel named by its
//! [`InputSurface`](crate::encoder::InputSurface), and the display
//! mirror's capture pipeline renders the screen into that channel.
//!
//! ```text
//! display:  ximagesrc ! videoscale ! videoconvert ! intervideosink channel=C
//! encoder:  intervideosrc channel=C ! videoconvert ! <h264 encoder> ! h264parse ! appsink
//! ```
//!
//! Hardware encoders are preferred when their elements are installed.

mod codec;
mod display;

use gstreamer as gst;
use tracing::{debug, info};

use crate::backend::MediaBackend;
use crate::encoder::VideoCodec;
use crate::error::MirrorError;
use crate::mirror::DisplayMirror;

pub use codec::GstCodec;
pub use display::GstDisplayMirror;

/// Encoder elements in order of preference (hardware first).
const ENCODERS: [&str; 4] = ["vaapih264enc", "nvh264enc", "v4l2h264enc", "x264enc"];

/// Pick the best H.264 encoder element available on this machine.
pub fn detect_encoder() -> Option<&'static str> {
    for name in ENCODERS {
        if let Some(factory) = gst::ElementFactory::find(name) {
            debug!(
                "found encoder: {name} - {}",
                factory.metadata("long-name").unwrap_or("")
            );
            return Some(name);
        }
    }
    None
}

/// Backend that builds GStreamer pipelines for each session.
#[derive(Debug, Clone)]
pub struct GstBackend {
    encoder_element: &'static str,
}

impl GstBackend {
    /// Initialise GStreamer and pick an encoder element.
    pub fn new() -> Result<Self, MirrorError> {
        gst::init().map_err(|e| MirrorError::Other(format!("failed to initialise GStreamer: {e}")))?;
        let encoder_element = detect_encoder().ok_or(MirrorError::BackendUnavailable(
            "no H.264 encoder element installed",
        ))?;
        info!("GStreamer backend using {encoder_element}");
        Ok(Self { encoder_element })
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn create_encoder(&self) -> Result<Box<dyn VideoCodec>, MirrorError> {
        Ok(Box::new(GstCodec::new(self.encoder_element)))
    }

    fn create_display_mirror(&self) -> Result<Box<dyn DisplayMirror>, MirrorError> {
        Ok(Box::new(GstDisplayMirror::new()))
    }
}
