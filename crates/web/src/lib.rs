//! HTTP request-security pipeline: static assets, CSRF, sessions, guards
//! and a request-scoped unit of work.

pub mod authz;
pub mod context;
pub mod csrf;
pub mod errors;
pub mod middleware;
pub mod pipeline;
pub mod static_files;
pub mod transaction;

pub use authz::{
    ADMIN_ENDPOINT, ConfiguredUrls, GuardState, LOGIN_ENDPOINT, UrlResolver, admin_required,
    is_admin, is_authenticated, login_required,
};
pub use context::CurrentUser;
pub use csrf::{
    CSRF_FAILURE_MESSAGE, CSRF_FIELD, CSRF_HEADER, CsrfState, CsrfToken, csrf_middleware,
    ensure_csrf_cookie, issue_csrf_token, set_csrf_cookie,
};
pub use errors::PipelineError;
pub use middleware::{never_cache, session_middleware};
pub use pipeline::Pipeline;
pub use static_files::{StaticError, StaticFiles, StaticRoot, resolve, static_files_middleware};
pub use transaction::{
    BoxError, ScopeError, TransactionLayer, TxScope, UnitOfWork, UnitOfWorkFactory,
};
