use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use wardgate_auth::{SessionAuthenticator, UserLoader};

use crate::context::CurrentUser;

/// Resolve the caller from the `session` cookie and attach it to the request.
///
/// Never rejects: a missing, forged, or expired token just yields an
/// anonymous [`CurrentUser`].
pub async fn session_middleware<L: UserLoader>(
    State(auth): State<SessionAuthenticator<L>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = auth.current_user(req.headers()).await;
    req.extensions_mut().insert(CurrentUser::new(user));

    next.run(req).await
}

/// Stamp headers that keep browsers and proxies from caching the response.
///
/// Meant for pages that show per-user data, so that the back button does not
/// resurrect them after logout.
pub async fn never_cache(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    response
}
