//! Shared Error Types
//!
//! Errors that every layer of the survey core can produce: the local store,
//! the sync engine's row translation and the UI-facing state all validate
//! entities through the same rules.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - an entity violates a domain rule
//!
//! # Usage
//!
//! ```rust
//! use surveysync::shared::error::SharedError;
//!
//! let error = SharedError::validation("x", "must be within [0, 1]");
//! assert!(error.to_string().contains("'x'"));
//! ```
use thiserror::Error;

/// Shared error types that can occur in any layer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
