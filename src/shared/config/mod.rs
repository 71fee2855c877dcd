//! Application configuration module
//!
//! `AppConfig` is the serde view of `surveysync.toml`. Every key is optional
//! in the file; missing keys fall back to the defaults below.
//!
//! ```toml
//! remote_url = "https://project.example.co"
//! api_key = "anon-key"
//! media_capacity = 50
//! sync_interval_secs = 30
//! remote_timeout_secs = 15
//!
//! [retry]
//! max_attempts = 8
//! base_delay_ms = 2000
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default number of photos kept on the device
pub const DEFAULT_MEDIA_CAPACITY: usize = 50;

/// Default storage bucket for install photos
pub const DEFAULT_PHOTO_BUCKET: &str = "install-photos";

/// Application configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote authority
    pub remote_url: Option<String>,
    /// Public API key sent with every remote call
    pub api_key: Option<String>,
    /// Storage bucket photos are uploaded to
    pub photo_bucket: String,
    /// Local database file; platform data dir when unset
    pub database_path: Option<PathBuf>,
    /// Maximum number of photos kept locally
    pub media_capacity: usize,
    /// Periodic push interval while online
    pub sync_interval_secs: u64,
    /// Deadline for a single remote call
    pub remote_timeout_secs: u64,
    /// Push in the background after each local write while online
    pub auto_sync: bool,
    /// Retry policy for queued mutations
    pub retry: RetrySettings,
}

/// Backoff settings for failed pushes
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 2_000,
            max_delay_ms: 300_000,
            jitter: 0.1,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            photo_bucket: DEFAULT_PHOTO_BUCKET.to_string(),
            database_path: None,
            media_capacity: DEFAULT_MEDIA_CAPACITY,
            sync_interval_secs: 30,
            remote_timeout_secs: 15,
            auto_sync: true,
            retry: RetrySettings::default(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.remote_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.media_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "media_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "remote_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::InvalidValue {
                key: "retry.jitter",
                message: format!("{} is outside [0, 1]", self.retry.jitter),
            });
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the remote authority URL
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    pub fn photo_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.photo_bucket = bucket.into();
        self
    }

    pub fn sync_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync_interval_secs = secs;
        self
    }

    pub fn media_capacity(mut self, capacity: usize) -> Self {
        self.config.media_capacity = capacity;
        self
    }

    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote_timeout_secs = secs;
        self
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.config.auto_sync = enabled;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("cannot read config file {0}")]
    Io(String),
    #[error("cannot parse config: {0}")]
    Parse(String),
}
