//! Configuration management for wfsh-console
//!
//! All settings are bootstrap-time: the console restarts to pick up changes.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --backend-url)
//! 2. Environment variables (WFSH_CONSOLE_CONFIG for the file location)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration loaded from TOML file
///
/// The console holds no persistent state, so there is nothing here beyond
/// service wiring.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port for the renderer surface
    pub port: u16,

    /// Base URL of the backend flowsheet API
    pub backend_url: String,

    /// Base URL of the show-control service
    ///
    /// Defaults to `backend_url` when not specified.
    pub show_control_url: Option<String>,

    /// Entries per history page fetch
    pub page_limit: u32,

    /// Backend request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Initial live-channel reconnect delay in milliseconds
    pub reconnect_initial_delay_ms: u64,

    /// Reconnect delay cap in milliseconds
    pub reconnect_max_delay_ms: u64,

    /// Event bus capacity (events buffered per slow subscriber)
    pub event_capacity: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend_url: default_backend_url(),
            show_control_url: None,
            page_limit: default_page_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
///
/// `level` is the fallback filter; the `RUST_LOG` environment variable wins
/// when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    5881
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5880".to_string()
}

fn default_page_limit() -> u32 {
    50
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complete console configuration after overrides are applied
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend_url: String,
    pub show_control_url: String,
    pub page_limit: u32,
    pub request_timeout_ms: u64,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub event_capacity: usize,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional TOML file plus CLI overrides.
    ///
    /// A missing file is not an error when `toml_path` is `None`; the
    /// console then runs on built-in defaults.
    pub fn load(toml_path: Option<&Path>, cli_overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => wfsh_common::config::read_toml(path)
                .map_err(|e| Error::Config(e.to_string()))?,
            None => TomlConfig::default(),
        };

        let backend_url = cli_overrides
            .backend_url
            .unwrap_or(toml_config.backend_url);
        let show_control_url = cli_overrides
            .show_control_url
            .or(toml_config.show_control_url)
            .unwrap_or_else(|| backend_url.clone());

        let config = Config {
            port: cli_overrides.port.unwrap_or(toml_config.port),
            backend_url,
            show_control_url,
            page_limit: cli_overrides.page_limit.unwrap_or(toml_config.page_limit),
            request_timeout_ms: toml_config.request_timeout_ms,
            reconnect_initial_delay_ms: toml_config.reconnect_initial_delay_ms,
            reconnect_max_delay_ms: toml_config.reconnect_max_delay_ms,
            event_capacity: toml_config.event_capacity,
            logging: toml_config.logging,
        };

        if config.page_limit == 0 {
            return Err(Error::Config("page_limit must be at least 1".to_string()));
        }

        Ok(config)
    }

    /// Backend request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Initial live-channel reconnect delay as Duration
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    /// Live-channel reconnect delay cap as Duration
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load(None, ConfigOverrides::default()).expect("defaults are valid")
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub backend_url: Option<String>,
    pub show_control_url: Option<String>,
    pub page_limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load(None, ConfigOverrides::default()).unwrap();
        assert_eq!(config.port, 5881);
        assert_eq!(config.backend_url, "http://127.0.0.1:5880");
        assert_eq!(config.show_control_url, config.backend_url);
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 6001").unwrap();
        writeln!(file, "backend_url = \"http://backend.internal:9000\"").unwrap();

        let config = Config::load(Some(file.path()), ConfigOverrides::default()).unwrap();
        assert_eq!(config.port, 6001);
        assert_eq!(config.backend_url, "http://backend.internal:9000");
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.event_capacity, 1000);
    }

    #[test]
    fn test_cli_overrides_beat_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 6001").unwrap();

        let overrides = ConfigOverrides {
            port: Some(7002),
            backend_url: Some("http://other:1234".to_string()),
            ..Default::default()
        };

        let config = Config::load(Some(file.path()), overrides).unwrap();
        assert_eq!(config.port, 7002);
        assert_eq!(config.backend_url, "http://other:1234");
        // show_control follows the overridden backend URL
        assert_eq!(config.show_control_url, "http://other:1234");
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_limit = 0").unwrap();

        assert!(Config::load(Some(file.path()), ConfigOverrides::default()).is_err());
    }
}
