use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use wardgate_auth::AuthError;

/// Failure while assembling the pipeline at process start.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("static root is unusable: {0}")]
    StaticRoot(#[from] std::io::Error),
}

/// Plain-text error response with a fixed body.
///
/// Bodies are constants on purpose: nothing from the request or the
/// filesystem is echoed back.
pub fn plain_error(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
