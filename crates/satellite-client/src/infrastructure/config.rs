//! TOML-based configuration for the satellite daemon.
//!
//! The file lives wherever the caller says (the CLI default is
//! `satellite.toml` in the working directory):
//!
//! ```toml
//! [connection]
//! mode = "tcp"              # "tcp" or "ws"
//! host = "127.0.0.1"
//! port = 16622
//! url = "ws://127.0.0.1:16623"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file,
//! a missing section, or a file written by an older version all load into a
//! usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::network::{ConnectionDetails, DEFAULT_TCP_PORT, DEFAULT_WS_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which transport to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Tcp,
    Ws,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub mode: ConnectionMode,
    /// Companion host for TCP mode.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Full `ws://` or `wss://` URL for WebSocket mode.
    #[serde(default = "default_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_url() -> String {
    format!("ws://127.0.0.1:{DEFAULT_WS_PORT}")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::default(),
            host: default_host(),
            port: default_port(),
            url: default_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConnectionConfig {
    pub fn to_details(&self) -> ConnectionDetails {
        match self.mode {
            ConnectionMode::Tcp => ConnectionDetails::tcp(self.host.clone(), self.port),
            ConnectionMode::Ws => ConnectionDetails::websocket(self.url.clone()),
        }
    }
}

// ── Persistence ───────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Loads the config at `path`, returning defaults if the file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found", and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("satellite-config-{}-{name}", std::process::id()))
            .join("satellite.toml")
    }

    #[test]
    fn test_default_config_uses_companion_ports() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.connection.mode, ConnectionMode::Tcp);
        assert_eq!(cfg.connection.port, 16622);
        assert_eq!(cfg.connection.url, "ws://127.0.0.1:16623");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let cfg: ClientConfig = toml::from_str("[connection]\nhost = \"10.0.0.9\"\n").unwrap();

        assert_eq!(cfg.connection.host, "10.0.0.9");
        assert_eq!(cfg.connection.port, 16622);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_ws_mode_produces_websocket_details() {
        let cfg: ClientConfig =
            toml::from_str("[connection]\nmode = \"ws\"\nurl = \"ws://companion:16623\"\n").unwrap();

        assert_eq!(
            cfg.connection.to_details(),
            ConnectionDetails::websocket("ws://companion:16623")
        );
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let result: Result<ClientConfig, _> = toml::from_str("[connection]\nmode = \"udp\"\n");

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = ClientConfig::load_from(&scratch_path("missing")).unwrap();

        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn test_save_then_load_restores_config() {
        // Arrange
        let path = scratch_path("roundtrip");
        let mut cfg = ClientConfig::default();
        cfg.connection.host = "192.168.1.20".into();
        cfg.connection.port = 17000;
        cfg.logging.level = "debug".into();

        // Act
        cfg.save_to(&path).unwrap();
        let restored = ClientConfig::load_from(&path).unwrap();
        let _ = std::fs::remove_dir_all(path.parent().unwrap());

        // Assert
        assert_eq!(cfg, restored);
    }
}
