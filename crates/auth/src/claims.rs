use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload carried inside a session token.
///
/// Only the identity and the issue time are stored; expiry is derived from
/// the issue time and the configured maximum age at verification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims<I> {
    /// Identity of the caller (whatever the user loader understands).
    pub uid: I,

    /// Issued-at timestamp (unix seconds).
    pub iat: i64,
}

impl<I> SessionClaims<I> {
    pub fn new(uid: I, issued_at: DateTime<Utc>) -> Self {
        Self {
            uid,
            iat: issued_at.timestamp(),
        }
    }
}

/// Why a token was refused.
///
/// Both variants are soft failures: the session layer maps them to an
/// anonymous caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, corrupted, or forged. Deliberately not more specific.
    #[error("token is invalid")]
    Invalid,

    #[error("token has expired")]
    Expired,
}

/// Deterministically check a token's age.
///
/// Signature verification happens before this and is not repeated here.
pub fn validate_age(
    claims_iat: i64,
    now: DateTime<Utc>,
    max_age_secs: u64,
) -> Result<(), TokenError> {
    let age = now.timestamp().saturating_sub(claims_iat);
    if age < 0 {
        // Issued in the future: treat like an expired signature.
        return Err(TokenError::Expired);
    }
    if age.unsigned_abs() > max_age_secs {
        return Err(TokenError::Expired);
    }
    Ok(())
}
