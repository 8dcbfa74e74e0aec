//! Process-wide security configuration.
//!
//! A [`SecurityConfig`] is built once at process start (usually from the
//! environment) and then shared read-only, typically as `Arc<SecurityConfig>`.
//! Nothing in the request path can mutate it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cookie::SameSite;

use crate::error::{ConfigError, ConfigResult};

/// Default maximum age of a session token (30 days).
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 2_592_000;

/// Default upper bound for buffering a mutating request body.
pub const DEFAULT_MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

const ENV_SECRET_KEY: &str = "WARDGATE_SECRET_KEY";
const ENV_STATIC_URL: &str = "WARDGATE_STATIC_URL";
const ENV_STATIC_DIR: &str = "WARDGATE_STATIC_DIR";
const ENV_LOGIN_PATH: &str = "WARDGATE_LOGIN_PATH";
const ENV_ADMIN_PATH: &str = "WARDGATE_ADMIN_PATH";
const ENV_SESSION_MAX_AGE: &str = "WARDGATE_SESSION_MAX_AGE";
const ENV_COOKIE_SECURE: &str = "WARDGATE_COOKIE_SECURE";

/// Attributes applied to every cookie the pipeline writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    /// Whether to set the `Secure` flag (disable only for plain-HTTP development).
    pub secure: bool,
    /// SameSite policy.
    pub same_site: SameSite,
    /// Cookie path (default: "/").
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
        }
    }
}

/// A static directory served under its own URL prefix (e.g. one per mounted
/// sub-application).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    pub name: String,
    pub url_prefix: String,
    pub dir: PathBuf,
}

impl StaticMount {
    pub fn new(
        name: impl Into<String>,
        url_prefix: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> ConfigResult<Self> {
        Ok(Self {
            name: name.into(),
            url_prefix: normalize_prefix(url_prefix.into())?,
            dir: dir.into(),
        })
    }
}

/// Security settings shared by every pipeline component.
#[derive(Clone)]
pub struct SecurityConfig {
    secret_key: Vec<u8>,
    session_max_age: Duration,
    login_path: String,
    admin_landing_path: String,
    static_root: StaticMount,
    static_mounts: Vec<StaticMount>,
    cookies: CookieSettings,
    max_form_bytes: usize,
}

impl SecurityConfig {
    /// Create a configuration with defaults for everything but the secret.
    pub fn new(secret_key: impl Into<Vec<u8>>) -> ConfigResult<Self> {
        let secret_key = secret_key.into();
        if secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Self {
            secret_key,
            session_max_age: Duration::from_secs(DEFAULT_SESSION_MAX_AGE_SECS),
            login_path: "/auth/login".to_string(),
            admin_landing_path: "/admin".to_string(),
            static_root: StaticMount {
                name: "static".to_string(),
                url_prefix: "/static".to_string(),
                dir: PathBuf::from("static"),
            },
            static_mounts: Vec::new(),
            cookies: CookieSettings::default(),
            max_form_bytes: DEFAULT_MAX_FORM_BYTES,
        })
    }

    /// Build the configuration from `WARDGATE_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(ENV_SECRET_KEY).ok_or(ConfigError::MissingSecret)?;
        let mut config = Self::new(secret)?;

        let static_url = lookup(ENV_STATIC_URL);
        let static_dir = lookup(ENV_STATIC_DIR);
        if static_url.is_some() || static_dir.is_some() {
            let url = static_url.unwrap_or_else(|| config.static_root.url_prefix.clone());
            let dir = static_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| config.static_root.dir.clone());
            config = config.with_static_root(url, dir)?;
        }

        if let Some(path) = lookup(ENV_LOGIN_PATH) {
            config.login_path = path;
        }
        if let Some(path) = lookup(ENV_ADMIN_PATH) {
            config.admin_landing_path = path;
        }
        if let Some(raw) = lookup(ENV_SESSION_MAX_AGE) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    ConfigError::invalid_value(ENV_SESSION_MAX_AGE, e.to_string())
                })?;
            config.session_max_age = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_COOKIE_SECURE) {
            config.cookies.secure = parse_bool(ENV_COOKIE_SECURE, &raw)?;
        }

        Ok(config)
    }

    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_admin_landing_path(mut self, path: impl Into<String>) -> Self {
        self.admin_landing_path = path.into();
        self
    }

    /// Replace the global (fallback) static root.
    pub fn with_static_root(
        mut self,
        url_prefix: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> ConfigResult<Self> {
        self.static_root = StaticMount::new("static", url_prefix, dir)?;
        Ok(self)
    }

    /// Register a named static root. Named mounts are always checked before the
    /// global root, longest prefix first.
    pub fn with_static_mount(mut self, mount: StaticMount) -> Self {
        self.static_mounts.push(mount);
        // Stable sort keeps declaration order among equal-length prefixes.
        self.static_mounts
            .sort_by(|a, b| b.url_prefix.len().cmp(&a.url_prefix.len()));
        self
    }

    pub fn with_cookie_settings(mut self, cookies: CookieSettings) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_max_form_bytes(mut self, limit: usize) -> Self {
        self.max_form_bytes = limit;
        self
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }

    pub fn session_max_age(&self) -> Duration {
        self.session_max_age
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn admin_landing_path(&self) -> &str {
        &self.admin_landing_path
    }

    pub fn static_root(&self) -> &StaticMount {
        &self.static_root
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_root.dir
    }

    /// Named mounts in lookup order (most specific first).
    pub fn static_mounts(&self) -> &[StaticMount] {
        &self.static_mounts
    }

    pub fn cookies(&self) -> &CookieSettings {
        &self.cookies
    }

    pub fn max_form_bytes(&self) -> usize {
        self.max_form_bytes
    }
}

impl core::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret_key", &"[REDACTED]")
            .field("session_max_age", &self.session_max_age)
            .field("login_path", &self.login_path)
            .field("admin_landing_path", &self.admin_landing_path)
            .field("static_root", &self.static_root)
            .field("static_mounts", &self.static_mounts)
            .field("cookies", &self.cookies)
            .field("max_form_bytes", &self.max_form_bytes)
            .finish()
    }
}

fn normalize_prefix(prefix: String) -> ConfigResult<String> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix));
    }
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    Ok(trimmed.to_string())
}

fn parse_bool(key: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid_value(key, format!("expected a boolean, got '{other}'"))),
    }
}
