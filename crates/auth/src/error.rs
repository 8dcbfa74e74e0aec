use thiserror::Error;

use wardgate_core::ConfigError;

/// Hard failures in the auth layer.
///
/// Unlike [`crate::TokenError`], these indicate misconfiguration or a broken
/// environment and are never folded into "anonymous".
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("cookie value cannot be encoded as a header: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}
