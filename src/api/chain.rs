//! Ordered middleware composition.
//!
//! A [`Middleware`] turns one handler into another by wrapping it. Handlers
//! here are axum [`Router`]s, so a middleware is usually a single
//! `router.layer(...)` call. [`chain`] composes a list of them so that the
//! first entry ends up outermost:
//!
//! ```rust,ignore
//! let pipeline = chain([m1, m2, m3]);
//! let app = pipeline(handler); // m1(m2(m3(handler)))
//! ```
//!
//! The list is taken as given: no reordering, deduplication or validation.

use std::sync::Arc;

use axum::Router;

/// Handler transformer: wraps a router with one cross-cutting concern.
pub type Middleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// Compose `middlewares` into one transformer, first entry outermost.
pub fn chain<I>(middlewares: I) -> impl Fn(Router) -> Router
where
    I: IntoIterator<Item = Middleware>,
{
    let middlewares: Vec<Middleware> = middlewares.into_iter().collect();
    move |handler| {
        middlewares
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware(inner))
    }
}
