//! HTTP surface: the single report route wrapped in the middleware pipeline.
//!
//! Requests flow through, outermost first:
//!
//! 1. [`recovery`]: panics become `500`, the server keeps running
//! 2. [`request_id`]: correlation ID in a span, extension and header
//! 3. [`access_log`]: one structured record per request
//! 4. [`default_content`]: fallback `Content-Type`
//! 5. [`token_refresh`]: backend token valid before the handler runs
//! 6. [`crate::report::render_report`]

pub mod access_log;
pub mod chain;
pub mod default_content;
pub mod recovery;
pub mod request_id;
pub mod token_refresh;

use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};

use crate::{
    backend::BackendClient,
    report::{self, Reporter},
};
use access_log::access_log;
use chain::chain;
use default_content::default_content;
use recovery::recovery;
use request_id::request_id;
use token_refresh::token_refresh;

/// Build the report router with the full middleware pipeline applied.
pub fn router(
    reporter: Arc<Reporter>,
    client: Arc<BackendClient>,
    default_content_type: HeaderValue,
) -> Router {
    let handler = Router::new()
        .route("/report/{name}", get(report::render_report))
        .with_state(reporter);

    let pipeline = chain([
        recovery(),
        request_id(),
        access_log(),
        default_content(default_content_type),
        token_refresh(client),
    ]);

    pipeline(handler)
}
