use crate::app::local_db::LocalDatabase;
use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use std::path::PathBuf;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "SURVEY_CONFIG";
pub const REMOTE_URL_ENV: &str = "SURVEY_REMOTE_URL";
pub const API_KEY_ENV: &str = "SURVEY_API_KEY";
pub const DB_PATH_ENV: &str = "SURVEY_DB_PATH";

/// Application configuration wrapper.
///
/// Layers, lowest first: built-in defaults, the TOML file named by
/// `SURVEY_CONFIG`, then individual `SURVEY_*` variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
    access_token: Option<String>,
}

impl Config {
    /// Defaults only; ignores the environment
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self {
            app: builder.build()?,
            access_token: None,
        })
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut app = match lookup(CONFIG_ENV) {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(url) = lookup(REMOTE_URL_ENV) {
            app.remote_url = Some(url);
        }
        if let Some(key) = lookup(API_KEY_ENV) {
            app.api_key = Some(key);
        }
        if let Some(path) = lookup(DB_PATH_ENV) {
            app.database_path = Some(PathBuf::from(path));
        }

        app.validate()?;
        Ok(Self {
            app,
            access_token: None,
        })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Database file, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.app
            .database_path
            .clone()
            .unwrap_or_else(LocalDatabase::default_path)
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.app.remote_url.as_deref()
    }

    /// Remote URL and api key, both required to talk to the authority
    pub fn remote_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let url = self.remote_url().ok_or(ConfigError::MissingValue("remote_url"))?;
        let key = self
            .app
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingValue("api_key"))?;
        Ok((url, key))
    }

    /// Set the signed-in user's access token
    pub fn set_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub fn get_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn clear_token(&mut self) {
        self.access_token = None;
    }
}
