//! Configuration for the mirrorcast server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mirrorcast_core::SessionConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Encoder and mirroring settings.
    pub encoder: EncoderConfig,
    /// Which media backend produces encoders.
    pub backend: BackendConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// TCP port viewers connect to.
    pub port: u16,
    /// Disable Nagle on accepted sockets.
    pub nodelay: bool,
}

/// Encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoded width in pixels.
    pub width: u32,
    /// Encoded height in pixels.
    pub height: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    /// Upper bound on one encoder poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Name of the virtual display created per session.
    pub display_name: String,
}

/// Media backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GStreamer when compiled in and usable, otherwise none.
    Auto,
    /// GStreamer capture and encoding.
    Gstreamer,
    /// Loop a pre-encoded H.264 file.
    Replay,
    /// Accept connections but refuse to stream.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Annex-B H.264 file played by the replay backend.
    pub replay_file: PathBuf,
    /// Playback rate of the replay backend.
    pub replay_fps: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            encoder: EncoderConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 7373,
            nodelay: true,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            bit_rate: 4_000_000,
            poll_timeout_ms: 10,
            display_name: "mirrorcast".into(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Auto,
            replay_file: PathBuf::new(),
            replay_fps: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert encoder settings into a `SessionConfig`.
    pub fn to_session_config(&self) -> SessionConfig {
        let enc = &self.encoder;
        let display_name = if enc.display_name.trim().is_empty() {
            EncoderConfig::default().display_name
        } else {
            enc.display_name.clone()
        };
        SessionConfig {
            // H.264 needs even dimensions.
            width: enc.width.clamp(16, 4096) & !1,
            height: enc.height.clamp(16, 4096) & !1,
            bit_rate: enc.bit_rate.clamp(64_000, 100_000_000),
            poll_timeout: Duration::from_millis(enc.poll_timeout_ms.clamp(1, 1000)),
            display_name,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
