//! Double-submit CSRF protection.
//!
//! State-changing requests (POST, PUT, PATCH, DELETE) must carry the value of
//! the `csrf_token` cookie a second time, either as a `csrf_token` field in a
//! form-encoded or JSON body, or in the `X-CSRF-Token` header. The two copies
//! are compared in constant time.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};

use wardgate_auth::cookies::{append_set_cookie, build_cookie};
use wardgate_auth::{AuthError, CSRF_COOKIE_NAME, cookie_value};
use wardgate_core::{CookieSettings, SecurityConfig};

use crate::errors::plain_error;

/// Literal body of every CSRF rejection.
pub const CSRF_FAILURE_MESSAGE: &str = "CSRF token missing or invalid.";

/// Name of the submitted form/JSON field.
pub const CSRF_FIELD: &str = "csrf_token";

/// Header accepted as an alternative to the body field.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The CSRF value bound to the current request, for embedding in forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

#[derive(Debug, Clone)]
pub struct CsrfState {
    max_body_bytes: usize,
    cookies: CookieSettings,
}

impl CsrfState {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            max_body_bytes: config.max_form_bytes(),
            cookies: config.cookies().clone(),
        }
    }
}

/// Methods whose requests must pass the double-submit check.
pub fn is_protected_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Byte-equality that inspects every byte of the longer input.
///
/// A length difference is folded into the accumulator instead of returning
/// early, so neither a shared prefix nor a length mismatch shortens the loop.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    std::hint::black_box(diff) == 0
}

/// Generate a fresh token: 32 random bytes, hex-encoded.
pub fn issue_csrf_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Reject state-changing requests whose cookie and submitted token differ.
pub async fn csrf_middleware(State(state): State<CsrfState>, req: Request, next: Next) -> Response {
    if !is_protected_method(req.method()) {
        return next.run(req).await;
    }

    let cookie_token = cookie_value(req.headers(), CSRF_COOKIE_NAME).filter(|t| !t.is_empty());
    let (parts, body) = req.into_parts();

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(
                method = %parts.method,
                path = %parts.uri.path(),
                error = %err,
                "CSRF validation failed: request body could not be read"
            );
            return csrf_failure();
        }
    };

    let submitted = submitted_token(&parts.headers, &bytes);
    let valid = match (&cookie_token, &submitted) {
        (Some(cookie), Some(submitted)) => constant_time_eq(cookie.as_bytes(), submitted.as_bytes()),
        _ => false,
    };

    if !valid {
        tracing::error!(
            method = %parts.method,
            path = %parts.uri.path(),
            cookie_present = cookie_token.is_some(),
            submitted_present = submitted.is_some(),
            "CSRF validation failed: tokens do not match or are missing"
        );
        return csrf_failure();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Make sure every client holds a `csrf_token` cookie.
///
/// The current value (existing or freshly issued) is exposed to handlers as a
/// [`CsrfToken`] request extension.
pub async fn ensure_csrf_cookie(State(state): State<CsrfState>, mut req: Request, next: Next) -> Response {
    if let Some(existing) = cookie_value(req.headers(), CSRF_COOKIE_NAME).filter(|t| !t.is_empty()) {
        req.extensions_mut().insert(CsrfToken(existing));
        return next.run(req).await;
    }

    let token = match issue_csrf_token() {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(error = %err, "failed to generate CSRF token");
            return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error");
        }
    };

    req.extensions_mut().insert(CsrfToken(token.clone()));
    let mut response = next.run(req).await;

    if let Err(err) = set_csrf_cookie(response.headers_mut(), token, &state.cookies) {
        tracing::error!(error = %err, "failed to set CSRF cookie");
    }
    response
}

/// Write `token` as the `csrf_token` cookie.
///
/// Not http-only: the page must be able to read it and submit it back.
pub fn set_csrf_cookie(
    headers: &mut HeaderMap,
    token: String,
    settings: &CookieSettings,
) -> Result<(), AuthError> {
    let cookie = build_cookie(CSRF_COOKIE_NAME, token, false, settings);
    append_set_cookie(headers, &cookie)
}

fn csrf_failure() -> Response {
    plain_error(StatusCode::FORBIDDEN, CSRF_FAILURE_MESSAGE)
}

fn submitted_token(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    let from_body = if is_json(headers) {
        json_field(body)
    } else {
        form_field(body)
    };

    from_body
        .or_else(|| {
            headers
                .get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|t| !t.is_empty())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn json_field(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get(CSRF_FIELD)?.as_str().map(str::to_string)
}

fn form_field(body: &[u8]) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    pairs
        .into_iter()
        .find(|(k, _)| k == CSRF_FIELD)
        .map(|(_, v)| v)
}
