//! Factories for the platform pieces a session needs.
//!
//! A backend hands out a fresh encoder and display mirror for every
//! session; nothing is shared between sessions.

use crate::encoder::VideoCodec;
use crate::error::MirrorError;
use crate::mirror::DisplayMirror;

/// Source of per-session platform resources.
pub trait MediaBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn create_encoder(&self) -> Result<Box<dyn VideoCodec>, MirrorError>;

    fn create_display_mirror(&self) -> Result<Box<dyn DisplayMirror>, MirrorError>;
}

/// Backend used when no encoder support is compiled in. Every session
/// fails at configuration; the server itself keeps running.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl MediaBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn create_encoder(&self) -> Result<Box<dyn VideoCodec>, MirrorError> {
        Err(MirrorError::BackendUnavailable(
            "built without an encoder backend (enable the `gstreamer` feature)",
        ))
    }

    fn create_display_mirror(&self) -> Result<Box<dyn DisplayMirror>, MirrorError> {
        Err(MirrorError::BackendUnavailable(
            "built without a display mirror backend",
        ))
    }
}
