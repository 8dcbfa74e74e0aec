//! Signed, timestamped session tokens.
//!
//! Tokens are compact HS256 JWS strings carrying [`SessionClaims`]. The codec
//! owns the only copy of the signing keys; it is built once from the process
//! configuration and shared read-only.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Serialize, de::DeserializeOwned};

use wardgate_core::{ConfigError, SecurityConfig};

use crate::claims::{SessionClaims, TokenError, validate_age};
use crate::error::AuthError;

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    max_age_secs: u64,
}

impl TokenCodec {
    pub fn new(secret: &[u8], max_age_secs: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret.into());
        }

        // Expiry is checked against the caller-supplied clock in `verify`, so
        // the library's own wall-clock checks are disabled.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            max_age_secs,
        })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, AuthError> {
        Self::new(config.secret_key(), config.session_max_age().as_secs())
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Produce a signed token for `identity`, stamped with `now`.
    pub fn issue<I: Serialize>(&self, identity: &I, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims::new(identity, now);
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// Verify a token and return the identity it carries.
    ///
    /// The signature is checked first; any decoding failure (bad base64,
    /// truncated, wrong key, wrong algorithm, unexpected payload) collapses to
    /// [`TokenError::Invalid`]. Only a correctly signed token can be reported
    /// as [`TokenError::Expired`].
    pub fn verify<I: DeserializeOwned>(&self, token: &str, now: DateTime<Utc>) -> Result<I, TokenError> {
        let data = jsonwebtoken::decode::<SessionClaims<I>>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::Invalid)?;

        validate_age(data.claims.iat, now, self.max_age_secs)?;
        Ok(data.claims.uid)
    }
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("keys", &"[REDACTED]")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}
