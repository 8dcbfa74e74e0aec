//! Configuration error model.

use thiserror::Error;

/// Result type used when building process configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fatal configuration error.
///
/// These are raised at process start, never while serving a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The signing secret is missing or empty.
    #[error("secret key must be set and non-empty")]
    MissingSecret,

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    /// A static mount was declared with an unusable URL prefix.
    #[error("invalid static url prefix '{0}' (must start with '/')")]
    InvalidPrefix(String),
}

impl ConfigError {
    pub fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}
