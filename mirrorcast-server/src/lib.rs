//! # mirrorcast-server — Screen Mirroring Server
//!
//! Listens on a TCP port, and for each viewer (one at a time) configures
//! a fresh H.264 encoder, mirrors the display into it, and pushes every
//! encoded access unit to the viewer as a length-prefixed frame.
//!
//! ## Backends
//!
//! - **gstreamer**: X11 capture and a hardware or x264 encoder
//!   (requires the `gstreamer` feature).
//! - **replay**: loops a pre-encoded Annex-B file.
//! - **none**: accepts viewers but cannot stream.

pub mod backend;
pub mod config;
pub mod service;
