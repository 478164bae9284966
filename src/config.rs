//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hub::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the WebSocket upgrade route
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_route() -> String {
    "/ws".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            route: default_route(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Broadcast hub settings, in milliseconds as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_expected_peers")]
    pub expected_peers: usize,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_close_grace")]
    pub close_grace_period_ms: u64,

    #[serde(default = "default_close_grace")]
    pub close_grace_write_timeout_ms: u64,

    /// 0 disables the bound
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_expected_peers() -> usize {
    10
}

fn default_ping_timeout() -> u64 {
    10_000
}

fn default_ping_interval() -> u64 {
    5_000
}

fn default_close_grace() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    10_000
}

fn default_shutdown_timeout() -> u64 {
    10_000
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            expected_peers: default_expected_peers(),
            ping_timeout_ms: default_ping_timeout(),
            ping_interval_ms: default_ping_interval(),
            close_grace_period_ms: default_close_grace(),
            close_grace_write_timeout_ms: default_close_grace(),
            write_timeout_ms: default_write_timeout(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("herald").join("config.toml")),
            Some(PathBuf::from("/etc/herald/config.toml")),
            Some(PathBuf::from("./herald.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = ?path, "Loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Failed to load config");
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = var("HERALD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("HERALD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Hub overrides
        if let Some(ms) = var("HERALD_PING_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.hub.ping_timeout_ms = ms;
        }
        if let Some(ms) = var("HERALD_PING_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.hub.ping_interval_ms = ms;
        }

        // Logging overrides
        if let Some(level) = var("HERALD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("HERALD_LOG_FORMAT") {
            self.logging.format = format;
        }
        if var("DEBUG_MODE").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            self.logging.level = "debug".to_string();
        }
    }

    /// Hub configuration with durations; validated when the hub starts
    pub fn hub_config(&self) -> HubConfig {
        let hub = &self.hub;
        HubConfig {
            expected_peers: hub.expected_peers,
            ping_timeout: Duration::from_millis(hub.ping_timeout_ms),
            ping_interval: Duration::from_millis(hub.ping_interval_ms),
            close_grace_period: Duration::from_millis(hub.close_grace_period_ms),
            close_grace_write_timeout: Duration::from_millis(hub.close_grace_write_timeout_ms),
            write_timeout: match hub.write_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            shutdown_timeout: Duration::from_millis(hub.shutdown_timeout_ms),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Herald Configuration
#
# Environment variables override these settings:
# - HERALD_HOST
# - HERALD_PORT
# - HERALD_PING_TIMEOUT_MS
# - HERALD_PING_INTERVAL_MS
# - HERALD_LOG_LEVEL
# - HERALD_LOG_FORMAT
# - DEBUG_MODE=true (sets the log level to debug)

[server]
# Listener host
host = "0.0.0.0"

# Listener port
port = 1234

# WebSocket route
route = "/ws"

[hub]
# Expected number of peers (sizes the event queue)
expected_peers = 10

# A peer that sends nothing for this long is dropped (ms)
ping_timeout_ms = 10000

# How often every peer is pinged; must be below ping_timeout_ms (ms)
ping_interval_ms = 5000

# Time peers get to answer the close frame on shutdown (ms)
close_grace_period_ms = 10

# Bound on writing the close frame on shutdown (ms)
close_grace_write_timeout_ms = 10

# Bound on each message write; 0 disables it (ms)
write_timeout_ms = 10000

# Overall bound on shutdown (ms)
shutdown_timeout_ms = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
