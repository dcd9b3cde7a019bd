//! Report rendering: `GET /report/{name}`.
//!
//! A request names a report in its path and narrows it with the optional
//! `zone`, `cluster` and `host` query parameters. The [`Reporter`] turns the
//! scope into a backend filter, fetches the report data, and renders it
//! through the `<name>.tmpl` template.

mod scope;
pub mod templates;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use scope::ReportScope;
pub use templates::{DirectorySource, TemplateSource};

use crate::{
    backend::{BackendClient, BackendError},
    error::AppError,
};
use templates::{TemplateError, TemplateSet};

/// Decoded backend payload handed to the report template as-is.
///
/// The reporter does not interpret the data; top-level keys become template
/// variables (`{"hosts": 3}` is available as `{{ hosts }}`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ReportData(serde_json::Map<String, serde_json::Value>);

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Templates(#[from] TemplateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to decode report data: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Renders named reports from backend data.
pub struct Reporter {
    client: Arc<BackendClient>,
    templates: TemplateSet,
}

impl Reporter {
    pub fn new(client: Arc<BackendClient>, source: Arc<dyn TemplateSource>) -> Self {
        Self {
            client,
            templates: TemplateSet::new(source),
        }
    }

    /// Render report `name` for `scope`. No step is retried on failure.
    pub async fn report(&self, name: &str, scope: &ReportScope) -> Result<String, ReportError> {
        let env = self.templates.get().await?;

        let filter = scope.filter();
        debug!(report = name, ?filter, "reading report data");

        let ctx = self.client.context();
        let payload = self.client.read_report_data(&ctx, &filter).await?;
        let data: ReportData = serde_json::from_slice(&payload).map_err(ReportError::Decode)?;

        Ok(templates::render(&env, name, &data)?)
    }
}

/// `GET /report/{name}`: render the named report as HTML.
pub async fn render_report(
    State(reporter): State<Arc<Reporter>>,
    Path(name): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let scope = ReportScope::from_query(params);
    let page = reporter.report(&name, &scope).await?;
    Ok(([(header::CONTENT_TYPE, "text/html")], page).into_response())
}
