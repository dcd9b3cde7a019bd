//! Request ID middleware.
//!
//! Every report request gets a correlation ID:
//!
//! - Taken from the caller's `X-Request-ID` header when present and non-empty
//! - Freshly generated (UUID v4) otherwise
//! - Stored as a [`RequestId`] request extension for downstream code
//! - Attached to a [`tracing`] span wrapping the rest of the chain, so every
//!   log line of the request (access log, backend errors, panics) carries it
//! - Echoed back in the `X-Request-ID` response header

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{from_fn, Next},
    response::Response,
    Router,
};
use tracing::Instrument as _;
use uuid::Uuid;

use super::chain::Middleware;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation ID assigned to the current request.
///
/// ```rust,ignore
/// async fn handler(Extension(RequestId(id)): Extension<RequestId>) { ... }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Chain entry for [`request_id_middleware`].
pub fn request_id() -> Middleware {
    Arc::new(|router: Router| router.layer(from_fn(request_id_middleware)))
}

/// Axum middleware that assigns a [`RequestId`] to every request.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}
