//! Access guards for individual routes.
//!
//! Guards are route middleware: they run after the session middleware has
//! attached a [`CurrentUser`], and before the handler. Because they wrap the
//! route service rather than the handler function, any handler (whatever its
//! extractors, sync body or awaiting) is guarded without changes.
//!
//! ```ignore
//! let admin = Router::new()
//!     .route("/admin/users", get(list_users))
//!     .route_layer(from_fn_with_state(guards.clone(), admin_required::<AppUser>));
//! ```
//!
//! A failed precondition is a navigation event: the guard answers with a
//! redirect and never with an error body.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use wardgate_auth::Caller;
use wardgate_core::SecurityConfig;

use crate::context::CurrentUser;

/// Endpoint name of the login page.
pub const LOGIN_ENDPOINT: &str = "auth.login";

/// Endpoint name of the elevated-area landing page.
pub const ADMIN_ENDPOINT: &str = "admin.index";

/// Resolves endpoint names to URLs (supplied by the routing layer).
pub trait UrlResolver: Send + Sync + 'static {
    fn url_for(&self, endpoint: &str) -> Option<String>;
}

/// Resolver backed by the paths in [`SecurityConfig`].
#[derive(Debug, Clone)]
pub struct ConfiguredUrls {
    login: String,
    admin: String,
}

impl ConfiguredUrls {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            login: config.login_path().to_string(),
            admin: config.admin_landing_path().to_string(),
        }
    }
}

impl UrlResolver for ConfiguredUrls {
    fn url_for(&self, endpoint: &str) -> Option<String> {
        match endpoint {
            LOGIN_ENDPOINT => Some(self.login.clone()),
            ADMIN_ENDPOINT => Some(self.admin.clone()),
            _ => None,
        }
    }
}

/// Shared state for the guard middleware.
#[derive(Clone)]
pub struct GuardState {
    urls: Arc<dyn UrlResolver>,
}

impl GuardState {
    pub fn new(urls: Arc<dyn UrlResolver>) -> Self {
        Self { urls }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(Arc::new(ConfiguredUrls::from_config(config)))
    }

    fn redirect_to(&self, endpoint: &str) -> Response {
        let target = self.urls.url_for(endpoint).unwrap_or_else(|| {
            tracing::warn!(endpoint, "guard redirect target not resolvable; using '/'");
            "/".to_string()
        });
        Redirect::to(&target).into_response()
    }
}

/// Precondition: the caller is authenticated.
pub fn is_authenticated<U: Caller>(user: &CurrentUser<U>) -> bool {
    user.user().is_some()
}

/// Precondition: the caller is authenticated and carries the admin flag.
pub fn is_admin<U: Caller>(user: &CurrentUser<U>) -> bool {
    user.user().is_some_and(Caller::is_admin)
}

/// Redirect anonymous callers to the login page.
pub async fn login_required<U: Caller>(
    State(guards): State<GuardState>,
    user: CurrentUser<U>,
    req: Request,
    next: Next,
) -> Response {
    if !is_authenticated(&user) {
        tracing::debug!(path = %req.uri().path(), "anonymous caller redirected to login");
        return guards.redirect_to(LOGIN_ENDPOINT);
    }
    next.run(req).await
}

/// Redirect callers without elevated privilege to the admin landing page.
///
/// Anonymous callers go to the same place, so the redirect does not reveal
/// whether authentication or elevation is what is missing.
pub async fn admin_required<U: Caller>(
    State(guards): State<GuardState>,
    user: CurrentUser<U>,
    req: Request,
    next: Next,
) -> Response {
    if !is_admin(&user) {
        tracing::debug!(path = %req.uri().path(), "caller without elevation redirected");
        return guards.redirect_to(ADMIN_ENDPOINT);
    }
    next.run(req).await
}
