//! Receiver configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mirrorcast_core::DEFAULT_CONTROL_PORT;

/// Top-level configuration for the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecvConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Where the video goes.
    pub output: OutputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Delay before reconnecting after a drop, in milliseconds.
    pub reconnect_ms: u64,
    /// Connection timeout in milliseconds.
    pub timeout_ms: u64,
    /// Port of the device's input daemon on the same host.
    pub control_port: u16,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File to append the H.264 stream to, or "-" for stdout.
    pub path: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for RecvConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7373,
            reconnect_ms: 500,
            timeout_ms: 3000,
            control_port: DEFAULT_CONTROL_PORT,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { path: "-".into() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl RecvConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// `host:port` of the server.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    /// `host:port` of the input daemon.
    pub fn control_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.control_port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.network.reconnect_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms.max(1))
    }

    /// Whether the stream goes to stdout.
    pub fn writes_stdout(&self) -> bool {
        let path = self.output.path.trim();
        path.is_empty() || path == "-"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RecvConfig::default();
        assert_eq!(cfg.server_address(), "127.0.0.1:7373");
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(500));
        assert!(cfg.writes_stdout());
        assert_eq!(cfg.control_address(), "127.0.0.1:22222");
    }

    #[test]
    fn control_port_override() {
        let parsed: RecvConfig = toml::from_str("[network]\ncontrol_port = 27183\n").unwrap();
        assert_eq!(parsed.control_address(), "127.0.0.1:27183");
        assert_eq!(parsed.network.port, 7373);
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&RecvConfig::default()).unwrap();
        let parsed: RecvConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 7373);
        assert_eq!(parsed.network.reconnect_ms, 500);
        assert_eq!(parsed.output.path, "-");
    }

    #[test]
    fn file_output() {
        let parsed: RecvConfig =
            toml::from_str("[output]\npath = \"capture.h264\"\n").unwrap();
        assert!(!parsed.writes_stdout());
        assert_eq!(parsed.network.host, "127.0.0.1");
    }

    #[test]
    fn zero_delays_are_raised() {
        let mut cfg = RecvConfig::default();
        cfg.network.reconnect_ms = 0;
        cfg.network.timeout_ms = 0;
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(1));
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(1));
    }
}
