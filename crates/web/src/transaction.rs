//! Request-scoped unit of work.
//!
//! [`TransactionLayer`] gives every request its own [`TxScope`]. Downstream
//! code opens the unit of work lazily through [`TxScope::unit`]; the layer
//! closes it when the request is done:
//!
//! - success: commit, then release
//! - inner service error, panic, or 5xx response: rollback, then release, then
//!   hand the original error/panic/response back unchanged
//! - request future dropped (client gone, timeout): rollback and release run
//!   on a spawned task
//!
//! A scope is closed exactly once and can not be reopened, so a handle that
//! leaks past its request is inert.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    response::Response,
};
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tower::{Layer, Service};

use crate::errors::plain_error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("unit of work backend error: {0}")]
    Backend(#[source] BoxError),

    #[error("transactional scope is closed")]
    Closed,
}

impl ScopeError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// A transactional resource bound to one request (e.g. a database session).
#[async_trait]
pub trait UnitOfWork: Send + 'static {
    async fn commit(&mut self) -> Result<(), ScopeError>;

    async fn rollback(&mut self) -> Result<(), ScopeError>;

    /// Return the underlying resource (connection, session) to its owner.
    async fn release(&mut self);
}

/// Opens units of work on demand.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync + 'static {
    type Unit: UnitOfWork;

    async fn begin(&self) -> Result<Self::Unit, ScopeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Commit,
    Rollback,
}

enum ScopeState<U> {
    Idle,
    Open(U),
    Closed,
}

/// Per-request handle to the lazily opened unit of work.
///
/// Available to handlers as `Extension<TxScope<U>>`.
pub struct TxScope<U: UnitOfWork> {
    factory: Arc<dyn UnitOfWorkFactory<Unit = U>>,
    state: Arc<Mutex<ScopeState<U>>>,
}

impl<U: UnitOfWork> Clone for TxScope<U> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            state: Arc::clone(&self.state),
        }
    }
}

impl<U: UnitOfWork> TxScope<U> {
    pub fn new(factory: Arc<dyn UnitOfWorkFactory<Unit = U>>) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(ScopeState::Idle)),
        }
    }

    /// Access the unit of work, opening it on first use.
    ///
    /// The returned guard holds the scope lock; drop it before awaiting
    /// unrelated work that might need the scope again.
    pub async fn unit(&self) -> Result<MappedMutexGuard<'_, U>, ScopeError> {
        let mut guard = self.state.lock().await;
        if let ScopeState::Idle = *guard {
            let unit = self.factory.begin().await?;
            *guard = ScopeState::Open(unit);
        }

        MutexGuard::try_map(guard, |state| match state {
            ScopeState::Open(unit) => Some(unit),
            _ => None,
        })
        .map_err(|_| ScopeError::Closed)
    }

    /// Whether a unit of work has been opened and not yet closed.
    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, ScopeState::Open(_))
    }

    /// Close the scope: commit or roll back the unit if one was opened, then
    /// release it. Subsequent calls are no-ops.
    ///
    /// The unit stays in the shared state until it has been released, so a
    /// finish that is dropped midway leaves it for the cancellation path.
    async fn finish(&self, outcome: Outcome) -> Result<(), ScopeError> {
        let mut state = self.state.lock().await;
        if !matches!(*state, ScopeState::Open(_)) {
            *state = ScopeState::Closed;
            return Ok(());
        }
        let ScopeState::Open(unit) = &mut *state else {
            return Ok(());
        };

        let result = match outcome {
            Outcome::Commit => match unit.commit().await {
                Ok(()) => Ok(()),
                Err(err) => {
                    tracing::error!(error = %err, "commit failed; rolling back");
                    if let Err(rollback_err) = unit.rollback().await {
                        tracing::error!(error = %rollback_err, "rollback after failed commit also failed");
                    }
                    Err(err)
                }
            },
            Outcome::Rollback => {
                tracing::warn!("rolling back request unit of work");
                unit.rollback().await.inspect_err(|err| {
                    tracing::error!(error = %err, "rollback failed");
                })
            }
        };

        unit.release().await;
        *state = ScopeState::Closed;
        result
    }
}

/// Rolls the scope back if the request future is dropped before finishing.
struct CancelGuard<U: UnitOfWork> {
    scope: Option<TxScope<U>>,
}

impl<U: UnitOfWork> CancelGuard<U> {
    fn arm(scope: TxScope<U>) -> Self {
        Self { scope: Some(scope) }
    }

    fn disarm(&mut self) {
        self.scope = None;
    }
}

impl<U: UnitOfWork> Drop for CancelGuard<U> {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("request cancelled; rolling back on a background task");
                handle.spawn(async move {
                    let _ = scope.finish(Outcome::Rollback).await;
                });
            }
            Err(_) => {
                // No runtime left to drive async cleanup: close the scope and
                // drop the unit, which abandons its uncommitted work.
                if let Ok(mut state) = scope.state.try_lock() {
                    *state = ScopeState::Closed;
                }
                tracing::warn!("request cancelled outside a runtime; unit of work dropped without release");
            }
        }
    }
}

/// Layer that binds a [`TxScope`] to each request.
pub struct TransactionLayer<U: UnitOfWork> {
    factory: Arc<dyn UnitOfWorkFactory<Unit = U>>,
}

impl<U: UnitOfWork> Clone for TransactionLayer<U> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<U: UnitOfWork> TransactionLayer<U> {
    pub fn new(factory: Arc<dyn UnitOfWorkFactory<Unit = U>>) -> Self {
        Self { factory }
    }
}

impl<S, U: UnitOfWork> Layer<S> for TransactionLayer<U> {
    type Service = TransactionService<S, U>;

    fn layer(&self, inner: S) -> Self::Service {
        TransactionService {
            inner,
            factory: Arc::clone(&self.factory),
        }
    }
}

pub struct TransactionService<S, U: UnitOfWork> {
    inner: S,
    factory: Arc<dyn UnitOfWorkFactory<Unit = U>>,
}

impl<S: Clone, U: UnitOfWork> Clone for TransactionService<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<S, U> Service<Request> for TransactionService<S, U>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    U: UnitOfWork,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The ready clone stays with us; the polled one serves this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let scope = TxScope::new(Arc::clone(&self.factory));
        req.extensions_mut().insert(scope.clone());

        Box::pin(async move {
            let mut cancel = CancelGuard::arm(scope.clone());
            let outcome = AssertUnwindSafe(inner.call(req)).catch_unwind().await;

            match outcome {
                Ok(Ok(response)) if !response.status().is_server_error() => {
                    let committed = scope.finish(Outcome::Commit).await;
                    cancel.disarm();
                    match committed {
                        Ok(()) => Ok(response),
                        Err(_) => Ok(plain_error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "500 Internal Server Error",
                        )),
                    }
                }
                Ok(Ok(response)) => {
                    let _ = scope.finish(Outcome::Rollback).await;
                    cancel.disarm();
                    Ok(response)
                }
                Ok(Err(err)) => {
                    let _ = scope.finish(Outcome::Rollback).await;
                    cancel.disarm();
                    Err(err)
                }
                Err(panic) => {
                    let _ = scope.finish(Outcome::Rollback).await;
                    cancel.disarm();
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording unit of work shared by unit and integration-style tests.

    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct Journal {
        pub events: StdMutex<Vec<&'static str>>,
    }

    impl Journal {
        pub fn record(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        pub fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, event: &str) -> usize {
            self.events().iter().filter(|e| **e == event).count()
        }
    }

    pub struct RecordingUnit {
        pub journal: Arc<Journal>,
        pub fail_commit: bool,
        pub stall_commit: bool,
    }

    impl RecordingUnit {
        pub fn write(&mut self) {
            self.journal.record("write");
        }
    }

    #[async_trait]
    impl UnitOfWork for RecordingUnit {
        async fn commit(&mut self) -> Result<(), ScopeError> {
            self.journal.record("commit");
            if self.stall_commit {
                std::future::pending::<()>().await;
            }
            if self.fail_commit {
                return Err(ScopeError::backend("constraint violated"));
            }
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), ScopeError> {
            self.journal.record("rollback");
            Ok(())
        }

        async fn release(&mut self) {
            self.journal.record("release");
        }
    }

    pub struct RecordingFactory {
        pub journal: Arc<Journal>,
        pub fail_commit: bool,
        pub stall_commit: bool,
    }

    #[async_trait]
    impl UnitOfWorkFactory for RecordingFactory {
        type Unit = RecordingUnit;

        async fn begin(&self) -> Result<RecordingUnit, ScopeError> {
            self.journal.record("begin");
            Ok(RecordingUnit {
                journal: self.journal.clone(),
                fail_commit: self.fail_commit,
                stall_commit: self.stall_commit,
            })
        }
    }

    pub fn factory(fail_commit: bool) -> (Arc<Journal>, Arc<dyn UnitOfWorkFactory<Unit = RecordingUnit>>) {
        build(fail_commit, false)
    }

    /// Units whose `commit` never completes.
    pub fn stalling_factory() -> (Arc<Journal>, Arc<dyn UnitOfWorkFactory<Unit = RecordingUnit>>) {
        build(false, true)
    }

    fn build(
        fail_commit: bool,
        stall_commit: bool,
    ) -> (Arc<Journal>, Arc<dyn UnitOfWorkFactory<Unit = RecordingUnit>>) {
        let journal = Arc::new(Journal::default());
        let factory: Arc<dyn UnitOfWorkFactory<Unit = RecordingUnit>> = Arc::new(RecordingFactory {
            journal: journal.clone(),
            fail_commit,
            stall_commit,
        });
        (journal, factory)
    }
}
