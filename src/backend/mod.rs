//! Authenticated client for the metal backend service.
//!
//! One [`BackendClient`] is built at startup and shared by every request. It
//! owns the backend's bearer token: [`BackendClient::authorize`] performs the
//! credential exchange, [`BackendClient::ensure_token`] refreshes an expired
//! token (coalescing concurrent refreshes), and [`BackendClient::context`]
//! snapshots the current token for an outgoing call.

mod token;

use std::{sync::RwLock, time::Duration};

use anyhow::Context;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

pub use token::{AuthContext, Token};

use crate::{
    config::BackendConfig,
    flight::{FlightError, SingleFlight},
};

/// Errors surfaced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned HTTP {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("invalid login response: {0}")]
    InvalidLogin(#[source] reqwest::Error),

    #[error("token refresh failed: {0}")]
    Refresh(#[from] FlightError),
}

/// Filter for a report-data read. Unset scope fields are omitted from the
/// request body entirely so the backend applies no constraint for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadReportDataRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

pub struct BackendClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<Token>>,
    refresh: SingleFlight,
}

impl BackendClient {
    /// Build a client for the configured backend. No network traffic happens
    /// until [`authorize`][Self::authorize] or a data call.
    pub fn new(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            http,
            base_url: cfg.address.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password(),
            token: RwLock::new(None),
            refresh: SingleFlight::new(),
        })
    }

    /// Exchange the static credentials for a fresh token and store it.
    pub async fn authorize(&self) -> Result<(), BackendError> {
        let url = format!("{}/v1/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = check_status(&url, response).await?;
        let token: Token = response.json().await.map_err(BackendError::InvalidLogin)?;

        info!(username = %self.username, expires_at = %token.expires_at, "authorized with backend");
        *self.token.write().expect("token lock poisoned") = Some(token);
        Ok(())
    }

    /// Make sure the stored token is usable, re-authorizing if it has expired.
    ///
    /// Concurrent callers that find the token expired share a single
    /// re-authorization and all see its outcome.
    pub async fn ensure_token(&self) -> Result<(), BackendError> {
        let seen = self.refresh.epoch();
        if self.has_valid_token() {
            return Ok(());
        }

        debug!("backend token expired, refreshing");
        self.refresh.run(seen, || self.authorize()).await?;
        Ok(())
    }

    /// Snapshot the current token for an outgoing call.
    pub fn context(&self) -> AuthContext {
        AuthContext::new(self.token.read().expect("token lock poisoned").as_ref())
    }

    /// Fetch the JSON-encoded report data for the given filter.
    pub async fn read_report_data(
        &self,
        ctx: &AuthContext,
        request: &ReadReportDataRequest,
    ) -> Result<Bytes, BackendError> {
        let url = format!("{}/v1/reports/data", self.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(token) = ctx.bearer() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = check_status(&url, response).await?;
        response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { url, source })
    }

    fn has_valid_token(&self) -> bool {
        self.token
            .read()
            .expect("token lock poisoned")
            .as_ref()
            .is_some_and(Token::is_valid)
    }

    #[cfg(test)]
    pub(crate) fn set_token(&self, token: Option<Token>) {
        *self.token.write().expect("token lock poisoned") = token;
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        url: url.to_string(),
        status,
        body,
    })
}
