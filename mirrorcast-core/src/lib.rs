//! # mirrorcast-core
//!
//! Streaming pipeline for pushing a live, hardware-encoded screen
//! mirror to one TCP viewer at a time.
//!
//! This crate contains:
//! - **Wire format**: `AccessUnit`, `FrameType` and the `FrameCodec` for
//!   `tag | i32 length | payload` frames via `tokio_util`
//! - **Encoder**: the `VideoCodec` trait and `EncoderGuard`, which owns a
//!   codec for one session and releases it on every exit path
//! - **Mirror**: the `DisplayMirror` trait and `MirrorBinding`
//! - **Control**: `ControlEvent` and the `ControlCodec` for the input
//!   channel back to the device
//! - **Writer**: `FrameWriter`, one flushed frame per access unit
//! - **Session**: `StreamSession` state machine and drain loop, plus the
//!   `SessionSlot` that keeps sessions exclusive
//! - **Backends**: `MediaBackend` factories (replay, GStreamer)
//! - **Error**: `MirrorError` — typed, `thiserror`-based error hierarchy

pub mod backend;
pub mod codec;
pub mod control;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod mirror;
pub mod replay;
pub mod session;
pub mod writer;

#[cfg(feature = "gstreamer")]
pub mod gst;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backend::{MediaBackend, UnavailableBackend};
pub use codec::FrameCodec;
pub use control::{
    CONTROL_MAGIC, CONTROL_PACKET_SIZE, ControlCodec, ControlEvent, ControlKind,
    DEFAULT_CONTROL_PORT,
};
pub use encoder::{
    BufferFlags, DrainResult, EncoderFormat, EncoderGuard, InputSurface, OutputBuffer,
    OutputFormat, VideoCodec,
};
pub use error::MirrorError;
pub use frame::{AccessUnit, FrameType, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use mirror::{DisplayMirror, DisplayToken, MirrorBinding, Rect, SurfaceBinding};
pub use replay::{ReplayBackend, ReplayLog, ReplayScript};
pub use session::{
    SessionConfig, SessionExit, SessionPermit, SessionPhase, SessionReport, SessionSlot,
    StreamSession,
};
pub use writer::FrameWriter;

#[cfg(feature = "gstreamer")]
pub use gst::GstBackend;
