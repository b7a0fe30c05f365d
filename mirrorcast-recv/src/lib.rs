//! # mirrorcast-recv — Stream Receiver
//!
//! Viewer-side counterpart of `mirrorcast-server`. Connects to the
//! server, strips the wire framing, and saves the H.264 elementary
//! stream to a file or pipes it to stdout (e.g. into `ffplay -`).
//! Reconnects automatically when the server restarts or drops the
//! session. It can also push key presses to the device over the
//! separate input control channel.

pub mod config;
pub mod control;
pub mod receiver;
