//! Domain-specific error types for the mirrorcast pipeline.
//!
//! All fallible operations return `Result<T, MirrorError>`.
//! Errors raised while a session is running are fatal to that session
//! only; the connection acceptor is the fault isolation boundary.

use std::io;

use thiserror::Error;

/// The canonical error type for the streaming pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// An access unit with no payload was handed to the frame writer.
    #[error("refusing to frame an empty access unit")]
    EmptyPayload,

    /// The payload does not fit the 32-bit signed length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An incoming frame announced a length above the decoder limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An incoming frame announced a negative length.
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    /// A control packet did not start with the expected magic.
    #[error("bad control packet magic: {0:#010x}")]
    BadMagic(u32),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer closed or reset the connection.
    #[error("client disconnected")]
    Disconnected,

    // ── Encoder Errors ───────────────────────────────────────────
    /// The encoder rejected its configuration (unsupported format,
    /// resource busy).
    #[error("encoder configuration failed: {0}")]
    Configure(String),

    /// The encoder failed while running.
    #[error("codec error: {0}")]
    Codec(String),

    /// An encoder operation was invoked out of order.
    #[error("invalid encoder state: {0}")]
    InvalidState(&'static str),

    // ── Display Mirror Errors ────────────────────────────────────
    /// The primary display token could not be obtained.
    #[error("could not get display token")]
    DisplayUnavailable,

    /// The display mirror refused to create or bind a virtual display.
    #[error("display mirror error: {0}")]
    Mirror(String),

    // ── Session Errors ───────────────────────────────────────────
    /// Another session currently owns the encoder.
    #[error("another session is already active")]
    SessionBusy,

    /// A session phase transition was attempted from the wrong phase.
    #[error("invalid session transition: {0}")]
    InvalidPhase(&'static str),

    // ── Backend Errors ───────────────────────────────────────────
    /// No encoder backend is compiled into this build.
    #[error("media backend unavailable: {0}")]
    BackendUnavailable(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Map an I/O error from the client socket, folding the peer-closed
    /// kinds into [`MirrorError::Disconnected`].
    pub fn from_write(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => MirrorError::Disconnected,
            _ => MirrorError::Connection(e),
        }
    }

    /// Whether this error means the client went away rather than
    /// something on our side failing.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, MirrorError::Disconnected)
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}
