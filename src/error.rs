//! Unified HTTP error type for the report pipeline.
//!
//! [`AppError`] wraps [`anyhow::Error`] and converts it into a `500` response
//! via [`IntoResponse`], so handlers and middleware can return
//! `Result<T, AppError>` and propagate failures with `?`.
//!
//! The body is the error's message as plain text. No `Content-Type` is set
//! here: the default-content middleware fills one in on the way out.

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Wraps [`anyhow::Error`] so it can be returned from axum handlers.
///
/// Any type that implements `Into<anyhow::Error>` (which includes
/// `serde_json::Error`, `reqwest::Error`, and any `#[derive(thiserror::Error)]`
/// type) converts into an [`AppError`] via the blanket [`From`] implementation.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "handler error");
        let mut response = Response::new(Body::from(self.0.to_string()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
