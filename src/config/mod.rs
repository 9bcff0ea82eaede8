//! Configuration management for report-stream
//!
//! Supports configuration via:
//! 1. Config file (~/.config/report-stream/config.toml)
//! 2. Environment variables (REPORT_STREAM_BASE_URL, REPORT_STREAM_TIMEOUT_SECS, etc.)
//! 3. CLI arguments (override file/env settings)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend connection settings
    pub server: ServerSettings,

    /// Terminal output settings
    pub display: DisplaySettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Base URL that relative stream paths are resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Connect timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Deadline for a whole stream in seconds (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:8000".to_string()),
            connect_timeout_secs: Some(10),
            request_timeout_secs: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Terminal output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Re-render the finished report as Markdown
    pub markdown: bool,

    /// Print a stats line after each stream
    pub show_stats: bool,

    /// Show a spinner until the first text arrives
    pub spinner: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            markdown: true,
            show_stats: true,
            spinner: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when neither --log-level nor RUST_LOG is given
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("report-stream")
            .join("config.toml")
    }

    /// Load config from specific path
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("REPORT_STREAM_BASE_URL") {
            self.server.base_url = Some(url);
        }
        if let Some(secs) = lookup("REPORT_STREAM_CONNECT_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.server.connect_timeout_secs = Some(secs);
        }
        if let Some(secs) = lookup("REPORT_STREAM_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.server.request_timeout_secs = Some(secs);
        }
        if let Some(level) = lookup("REPORT_STREAM_LOG") {
            self.logging.level = level;
        }

        self
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base) = &self.server.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "server.base_url must be an http(s) URL, got {:?}",
                    base
                )));
            }
        }

        if self.server.connect_timeout_secs == Some(0) || self.server.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".to_string()));
        }

        if let Some(name) = self.server.headers.keys().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("empty header name {:?}", name)));
        }

        Ok(())
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.base_url = Some(url.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.server.request_timeout_secs = Some(secs);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.server.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
