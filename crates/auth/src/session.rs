//! Session authentication from the `session` cookie.
//!
//! Every failure mode on the read path (no cookie, bad signature, expired,
//! unknown identity) resolves to "anonymous" so that an outside observer can
//! not tell them apart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::HeaderMap;

use wardgate_core::{CookieSettings, SecurityConfig};

use crate::cookies::{
    SESSION_COOKIE_NAME, append_set_cookie, build_cookie, cookie_value, removal_cookie,
};
use crate::error::AuthError;
use crate::principal::{Caller, UserLoader};
use crate::token::TokenCodec;

/// Resolves the caller of a request and writes login/logout cookies.
pub struct SessionAuthenticator<L> {
    codec: TokenCodec,
    loader: Arc<L>,
    cookies: CookieSettings,
}

impl<L> Clone for SessionAuthenticator<L> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            loader: Arc::clone(&self.loader),
            cookies: self.cookies.clone(),
        }
    }
}

impl<L: UserLoader> SessionAuthenticator<L> {
    pub fn new(config: &SecurityConfig, loader: Arc<L>) -> Result<Self, AuthError> {
        Ok(Self {
            codec: TokenCodec::from_config(config)?,
            loader,
            cookies: config.cookies().clone(),
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Resolve the caller for a request's headers.
    pub async fn current_user(&self, headers: &HeaderMap) -> Option<L::User> {
        self.current_user_at(headers, Utc::now()).await
    }

    /// Same as [`Self::current_user`] with an explicit clock.
    pub async fn current_user_at(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Option<L::User> {
        let token = cookie_value(headers, SESSION_COOKIE_NAME).filter(|t| !t.is_empty())?;

        let id = match self.codec.verify::<<L::User as Caller>::Id>(&token, now) {
            Ok(id) => id,
            Err(reason) => {
                tracing::debug!(%reason, "session token rejected; continuing anonymously");
                return None;
            }
        };

        let user = self.loader.load(id).await;
        if user.is_none() {
            tracing::debug!("session identity no longer exists; continuing anonymously");
        }
        user
    }

    /// Issue a token for `caller` and set it as an http-only session cookie.
    pub fn login(&self, headers: &mut HeaderMap, caller: &L::User) -> Result<(), AuthError> {
        self.login_at(headers, caller, Utc::now())
    }

    pub fn login_at(
        &self,
        headers: &mut HeaderMap,
        caller: &L::User,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let token = self.codec.issue(&caller.identity(), now)?;
        let cookie = build_cookie(SESSION_COOKIE_NAME, token, true, &self.cookies);
        append_set_cookie(headers, &cookie)
    }

    /// Remove the session cookie.
    pub fn logout(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        append_set_cookie(headers, &removal_cookie(SESSION_COOKIE_NAME, &self.cookies))
    }
}
