//! Request cookie parsing and `Set-Cookie` construction.

use cookie::Cookie;
use http::HeaderMap;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};

use wardgate_core::CookieSettings;

use crate::error::AuthError;

/// Cookie holding the signed session token.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Cookie holding the double-submit CSRF value.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Find the value of cookie `name` across all `Cookie` headers.
///
/// Malformed cookie pairs are skipped; the first match wins.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Build a cookie carrying `value` with the configured attributes.
pub fn build_cookie(
    name: &'static str,
    value: String,
    http_only: bool,
    settings: &CookieSettings,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(settings.path.clone())
        .http_only(http_only)
        .secure(settings.secure)
        .same_site(settings.same_site)
        .build()
}

/// Build a cookie that instructs the client to drop `name`.
pub fn removal_cookie(name: &'static str, settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = build_cookie(name, String::new(), true, settings);
    cookie.make_removal();
    cookie
}

/// Append `cookie` as a `Set-Cookie` header.
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), AuthError> {
    let value = HeaderValue::from_str(&cookie.to_string())?;
    headers.append(SET_COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::SameSite;

    #[test]
    fn finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; session=tok; b=2"));
        assert_eq!(cookie_value(&headers, "session").as_deref(), Some("tok"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn searches_every_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("csrf_token=abc"));
        assert_eq!(cookie_value(&headers, CSRF_COOKIE_NAME).as_deref(), Some("abc"));
    }

    #[test]
    fn built_cookie_carries_settings() {
        let settings = CookieSettings {
            secure: false,
            same_site: SameSite::Strict,
            path: "/app".to_string(),
        };
        let cookie = build_cookie(SESSION_COOKIE_NAME, "tok".to_string(), true, &settings);

        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/app"));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie(SESSION_COOKIE_NAME, &CookieSettings::default());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::ZERO));
    }
}
