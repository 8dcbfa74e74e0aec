//! Composition of the request pipeline.
//!
//! Request order (outermost first):
//!
//! ```text
//! transactional scope -> static assets -> csrf cookie -> csrf guard -> session -> [route guards] -> handler
//! ```
//!
//! Responses travel back through the same layers in reverse, so the
//! transactional scope is the last to see the outcome.

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;

use wardgate_auth::{SessionAuthenticator, UserLoader};
use wardgate_core::SecurityConfig;

use crate::authz::{GuardState, UrlResolver};
use crate::csrf::{CsrfState, csrf_middleware, ensure_csrf_cookie};
use crate::errors::PipelineError;
use crate::middleware::session_middleware;
use crate::static_files::{StaticFiles, static_files_middleware};
use crate::transaction::{TransactionLayer, UnitOfWork, UnitOfWorkFactory};

/// Everything the pipeline needs, built once at process start.
pub struct Pipeline<L: UserLoader, U: UnitOfWork> {
    config: Arc<SecurityConfig>,
    auth: SessionAuthenticator<L>,
    csrf: CsrfState,
    statics: Arc<StaticFiles>,
    guards: GuardState,
    units: Arc<dyn UnitOfWorkFactory<Unit = U>>,
}

impl<L: UserLoader, U: UnitOfWork> Pipeline<L, U> {
    pub fn new(
        config: Arc<SecurityConfig>,
        loader: Arc<L>,
        units: Arc<dyn UnitOfWorkFactory<Unit = U>>,
    ) -> Result<Self, PipelineError> {
        let auth = SessionAuthenticator::new(&config, loader)?;
        let statics = Arc::new(StaticFiles::from_config(&config)?);

        tracing::debug!(
            static_roots = statics.roots().len(),
            "request pipeline configured"
        );

        Ok(Self {
            csrf: CsrfState::from_config(&config),
            guards: GuardState::from_config(&config),
            config,
            auth,
            statics,
            units,
        })
    }

    /// Replace the default (config-backed) redirect resolution for guards.
    pub fn with_url_resolver(mut self, urls: Arc<dyn UrlResolver>) -> Self {
        self.guards = GuardState::new(urls);
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Authenticator for login/logout handlers.
    pub fn authenticator(&self) -> &SessionAuthenticator<L> {
        &self.auth
    }

    /// State for `login_required` / `admin_required` route layers.
    pub fn guards(&self) -> GuardState {
        self.guards.clone()
    }

    /// Wrap the application router with the full pipeline.
    pub fn apply<S>(&self, app: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // ServiceBuilder lists layers outermost first.
        let stack = ServiceBuilder::new()
            .layer(TransactionLayer::new(Arc::clone(&self.units)))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.statics),
                static_files_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.csrf.clone(),
                ensure_csrf_cookie,
            ))
            .layer(middleware::from_fn_with_state(
                self.csrf.clone(),
                csrf_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.auth.clone(),
                session_middleware::<L>,
            ));

        app.layer(stack)
    }
}
