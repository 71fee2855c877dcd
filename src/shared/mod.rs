//! Shared Module
//!
//! Types that every layer of the survey core agrees on: the survey records
//! themselves, their validation rules, shared errors and the configuration
//! file schema. Everything here is serializable and free of I/O except
//! `AppConfig::from_file`.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Survey records and their sync metadata
pub mod survey;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError, RetrySettings};
pub use error::SharedError;
pub use survey::{EntityKind, MutationOp, SurveyEntity};
