//! Default `Content-Type` for responses that did not choose one.
//!
//! The header is only added when absent, so a handler's explicit value (the
//! reporter's `text/html`) always wins. Responses built without a content
//! type, such as [`crate::error::AppError`] bodies, pick up the default.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use super::chain::Middleware;

/// Chain entry applying `content_type` to responses that lack one.
pub fn default_content(content_type: HeaderValue) -> Middleware {
    Arc::new(move |router: Router| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            content_type.clone(),
        ))
    })
}
