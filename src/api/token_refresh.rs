//! Backend token refresh middleware.
//!
//! Runs before the reporter and makes sure the backend token is still valid,
//! re-authorizing with the static credentials when it has expired. A failed
//! refresh ends the request with a `500` naming the failure; the handler never
//! runs with a stale or missing token.
//!
//! Concurrent requests that hit an expired token share one refresh call (see
//! [`BackendClient::ensure_token`]).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use tracing::warn;

use super::chain::Middleware;
use crate::{backend::BackendClient, error::AppError};

/// Chain entry for [`token_refresh_middleware`].
pub fn token_refresh(client: Arc<BackendClient>) -> Middleware {
    Arc::new(move |router: Router| {
        router.layer(from_fn_with_state(
            Arc::clone(&client),
            token_refresh_middleware,
        ))
    })
}

/// Axum middleware: refresh the backend token if needed, then continue.
pub async fn token_refresh_middleware(
    State(client): State<Arc<BackendClient>>,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = client.ensure_token().await {
        warn!(error = %err, "aborting request: backend token could not be refreshed");
        return AppError::from(err).into_response();
    }

    next.run(req).await
}
