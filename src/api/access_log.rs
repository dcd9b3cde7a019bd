//! Structured access log.
//!
//! Exactly one `request completed` record is written per request with the
//! method, path, raw query, final status, remote address and elapsed time.
//!
//! The record is owned by an [`AccessRecord`] guard and written from its
//! `Drop`, so it fires on every exit path: a normal response, or an inner
//! chain that panicked and was discarded by the recovery middleware. In the
//! latter case no status was ever captured and the record reports `500`,
//! which is what the recovery middleware answers with, plus `completed=false`.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    extract::{ConnectInfo, Request},
    http::{Method, StatusCode},
    middleware::{from_fn, Next},
    response::Response,
    Router,
};
use tracing::info;

use super::chain::Middleware;

/// Chain entry for [`access_log_middleware`].
pub fn access_log() -> Middleware {
    Arc::new(|router: Router| router.layer(from_fn(access_log_middleware)))
}

/// Axum middleware emitting one access record per request.
pub async fn access_log_middleware(req: Request, next: Next) -> Response {
    let mut record = AccessRecord::start(&req);
    let response = next.run(req).await;
    record.write_header(response.status());
    response
}

/// Per-request capture of what the access log reports. Emits on drop.
struct AccessRecord {
    method: Method,
    path: String,
    query: String,
    remote: Option<SocketAddr>,
    started: Instant,
    status: Option<StatusCode>,
}

impl AccessRecord {
    fn start(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            query: req.uri().query().unwrap_or_default().to_owned(),
            remote: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            started: Instant::now(),
            status: None,
        }
    }

    /// Record the response status. Only the first call is kept.
    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }
}

impl Drop for AccessRecord {
    fn drop(&mut self) {
        let completed = self.status.is_some();
        let status = self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let remote = self
            .remote
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".into());

        info!(
            method = %self.method,
            path = %self.path,
            query = %self.query,
            status = status.as_u16(),
            remote = %remote,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            completed,
            "request completed"
        );
    }
}
