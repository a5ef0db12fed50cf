//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::websocket::FRAME_OVERHEAD_RESERVE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed origins for CORS and the WebSocket handshake. `"*"` allows any.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Accept the `X-User-Id` header as an authenticated identity.
    /// Development only; production puts a real auth layer in front.
    #[serde(default)]
    pub trust_user_header: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            trust_user_header: false,
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection hub tunables
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Deadline for a single socket write
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,

    /// Read deadline, renewed on every pong
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Interval between protocol pings; must be shorter than the pong wait
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,

    /// Largest accepted inbound frame in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Largest accepted chat message in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    #[serde(default = "default_max_messages_per_second")]
    pub max_messages_per_second: usize,

    /// Socket write buffer in bytes. The read side is sized by the transport.
    #[serde(default = "default_io_buffer_size")]
    pub write_buffer_size: usize,

    /// Capacity of the hub's broadcast intake queue
    #[serde(default = "default_queue_depth")]
    pub broadcast_buffer_size: usize,

    /// Capacity of each connection's outbound frame queue
    #[serde(default = "default_queue_depth")]
    pub client_send_buffer_size: usize,
}

fn default_write_wait() -> u64 {
    10
}

fn default_pong_wait() -> u64 {
    60
}

fn default_ping_period() -> u64 {
    30
}

fn default_max_frame_size() -> usize {
    4096
}

fn default_max_message_length() -> usize {
    500
}

fn default_max_messages_per_second() -> usize {
    3
}

fn default_io_buffer_size() -> usize {
    1024
}

fn default_queue_depth() -> usize {
    256
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: default_write_wait(),
            pong_wait_secs: default_pong_wait(),
            ping_period_secs: default_ping_period(),
            max_frame_size: default_max_frame_size(),
            max_message_length: default_max_message_length(),
            max_messages_per_second: default_max_messages_per_second(),
            write_buffer_size: default_io_buffer_size(),
            broadcast_buffer_size: default_queue_depth(),
            client_send_buffer_size: default_queue_depth(),
        }
    }
}

impl WebSocketConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    /// Hard cap handed to the transport. Frames between `max_frame_size` and
    /// this cap are dropped by the read pump without closing the connection.
    pub fn transport_message_limit(&self) -> usize {
        self.max_frame_size.saturating_mul(4)
    }

    /// Check that the tunables describe a working hub
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("max_frame_size", self.max_frame_size),
            ("max_message_length", self.max_message_length),
            ("max_messages_per_second", self.max_messages_per_second),
            ("broadcast_buffer_size", self.broadcast_buffer_size),
            ("client_send_buffer_size", self.client_send_buffer_size),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("websocket.{} must be > 0", name)));
            }
        }

        if self.write_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "websocket.write_wait_secs must be > 0".to_string(),
            ));
        }

        // Chat content gets whatever the envelope reserve leaves over
        if self.max_frame_size <= FRAME_OVERHEAD_RESERVE {
            return Err(ConfigError::Invalid(format!(
                "websocket.max_frame_size ({}) must be > {} to leave room for message content",
                self.max_frame_size, FRAME_OVERHEAD_RESERVE
            )));
        }

        if self.ping_period_secs == 0 || self.ping_period_secs >= self.pong_wait_secs {
            return Err(ConfigError::Invalid(format!(
                "websocket.ping_period_secs ({}) must be > 0 and < pong_wait_secs ({})",
                self.ping_period_secs, self.pong_wait_secs
            )));
        }

        Ok(())
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

        config.websocket.validate()?;
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
        config.websocket.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("agora").join("config.toml")),
            Some(PathBuf::from("/etc/agora/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("AGORA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("AGORA_PORT") {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("AGORA_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(trust) = std::env::var("AGORA_TRUST_USER_HEADER") {
            self.server.trust_user_header = trust.to_lowercase() == "true" || trust == "1";
        }

        if let Some(limit) = env_parse("AGORA_WS_MAX_MESSAGES_PER_SECOND") {
            self.websocket.max_messages_per_second = limit;
        }
        if let Some(length) = env_parse("AGORA_WS_MAX_MESSAGE_LENGTH") {
            self.websocket.max_message_length = length;
        }

        if let Ok(level) = std::env::var("AGORA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("AGORA_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Agora Configuration
#
# Environment variables override these settings:
# - AGORA_HOST
# - AGORA_PORT
# - AGORA_CORS_ORIGINS (comma separated)
# - AGORA_TRUST_USER_HEADER
# - AGORA_WS_MAX_MESSAGES_PER_SECOND
# - AGORA_WS_MAX_MESSAGE_LENGTH
# - AGORA_LOG_LEVEL
# - AGORA_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8080

# Allowed origins for CORS and the chat WebSocket handshake ("*" allows any)
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Trust the X-User-Id header as the authenticated user (development only)
trust_user_header = false

[websocket]
# Seconds allowed for a single socket write
write_wait_secs = 10

# Seconds without a pong before the connection is dropped
pong_wait_secs = 60

# Seconds between server pings (must be < pong_wait_secs)
ping_period_secs = 30

# Largest inbound frame (bytes)
max_frame_size = 4096

# Largest chat message (characters)
max_message_length = 500

# Chat messages allowed per connection per second
max_messages_per_second = 3

# Socket write buffer (bytes)
write_buffer_size = 1024

# Hub broadcast intake queue depth
broadcast_buffer_size = 256

# Per-connection outbound queue depth
client_send_buffer_size = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.websocket.max_frame_size, 4096);
        assert_eq!(config.websocket.max_message_length, 500);
        assert_eq!(config.websocket.max_messages_per_second, 3);
        assert_eq!(config.websocket.ping_period(), Duration::from_secs(30));
        assert!(config.websocket.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.websocket.pong_wait_secs, 60);
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.server.trust_user_header);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[websocket]\nmax_messages_per_second = 10").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.websocket.max_messages_per_second, 10);
        assert_eq!(config.websocket.client_send_buffer_size, 256);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_rejects_bad_ping_period() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[websocket]\nping_period_secs = 60\npong_wait_secs = 60").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/agora.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_validate_zero_queue() {
        let config = WebSocketConfig {
            client_send_buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_write_wait() {
        let config = WebSocketConfig {
            write_wait_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_frame_size_leaves_room_for_content() {
        for max_frame_size in [512, FRAME_OVERHEAD_RESERVE] {
            let config = WebSocketConfig {
                max_frame_size,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        // Smallest accepted frame still admits a short message
        let config = WebSocketConfig {
            max_frame_size: FRAME_OVERHEAD_RESERVE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(crate::websocket::validate_content("h", &config), Ok("h"));
    }

    #[test]
    fn test_legacy_read_buffer_key_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[websocket]\nread_buffer_size = 2048\nwrite_buffer_size = 2048").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.websocket.write_buffer_size, 2048);
    }
}
