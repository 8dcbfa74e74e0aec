use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Caller resolved for the current request.
///
/// Inserted by the session middleware; `None` means anonymous. Handlers take
/// it as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser<U>(pub Option<U>);

impl<U> CurrentUser<U> {
    pub fn new(user: Option<U>) -> Self {
        Self(user)
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(&self) -> Option<&U> {
        self.0.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }

    pub fn into_inner(self) -> Option<U> {
        self.0
    }
}

#[axum::async_trait]
impl<S, U> FromRequestParts<S> for CurrentUser<U>
where
    S: Send + Sync,
    U: Clone + Send + Sync + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Without the session layer there is no proof of identity.
        Ok(parts
            .extensions
            .get::<CurrentUser<U>>()
            .cloned()
            .unwrap_or_else(CurrentUser::anonymous))
    }
}
