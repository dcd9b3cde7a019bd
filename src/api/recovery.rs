//! Panic recovery middleware.
//!
//! A panic anywhere below this middleware is caught, logged, and answered with
//! a plain `500 Internal Server Error`; the connection and the server stay up.
//! It must be the outermost middleware so it sees panics from every layer
//! beneath it.
//!
//! The log line written here carries the panic message. The panic location and
//! backtrace are logged by the hook from [`install_panic_hook`], which runs at
//! the panic site inside the request's span.

use std::{any::Any, backtrace::Backtrace, panic::AssertUnwindSafe, sync::Arc};

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::{from_fn, Next},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::FutureExt as _;
use tracing::error;

use super::chain::Middleware;

/// Chain entry for [`recover_middleware`].
pub fn recovery() -> Middleware {
    Arc::new(|router: Router| router.layer(from_fn(recover_middleware)))
}

/// Axum middleware converting a panic in the inner chain into a `500`.
pub async fn recover_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    // The inner future, and every guard it owns, is dropped at the end of this
    // statement, before the recovery response is built.
    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;

    match outcome {
        Ok(response) => response,
        Err(panic) => {
            error!(
                %method,
                %path,
                panic = panic_message(panic.as_ref()),
                "recovered from panic in request handler"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Internal Server Error",
            )
                .into_response()
        }
    }
}

/// Route panic reports through `tracing` with their location and a backtrace
/// (captured when `RUST_BACKTRACE` enables it).
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".into());
        error!(
            panic = panic_message(info.payload()),
            %location,
            backtrace = %Backtrace::capture(),
            "panic"
        );
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
