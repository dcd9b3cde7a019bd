//! Lazily built set of report templates.
//!
//! Templates are not touched at startup. The first report request loads every
//! `*.tmpl` file from the configured [`TemplateSource`] and parses them into a
//! shared [`minijinja::Environment`]; later requests reuse it read-only.
//!
//! A failed build (unreadable directory, syntax error) fails the requests
//! that waited on it and is attempted again by the next request, so a
//! transient asset problem does not wedge the service.
//!
//! Every template also sees the `minijinja_contrib` helpers (`pluralize`,
//! `filesizeformat`, `datetimeformat`, ...) and Python-style methods on values
//! such as `{{ name.upper() }}`.
//!
//! Each file is registered under its file name, so `rack-usage.tmpl` renders
//! the `rack-usage` report and other templates can pull it in with
//! `{% include "rack-usage.tmpl" %}`.

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use anyhow::Context;
use minijinja::Environment;
use serde::Serialize;
use tracing::info;

use crate::flight::{FlightError, SingleFlight};

const TEMPLATE_EXTENSION: &str = "tmpl";

/// Raw template text as read from a [`TemplateSource`].
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub name: String,
    pub source: String,
}

/// Where template text comes from. Called from the blocking pool.
pub trait TemplateSource: Send + Sync + 'static {
    fn load(&self) -> anyhow::Result<Vec<TemplateFile>>;
}

/// Reads every `*.tmpl` file at the top level of a directory.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateSource for DirectorySource {
    fn load(&self) -> anyhow::Result<Vec<TemplateFile>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("reading template dir {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("listing template dir {}", self.dir.display()))?
                .path();
            let is_template =
                path.extension().and_then(|ext| ext.to_str()) == Some(TEMPLATE_EXTENSION);
            if !is_template || !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("reading template {}", path.display()))?;
            files.push(TemplateFile {
                name: name.to_owned(),
                source,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to load report templates: {0}")]
    Load(#[from] FlightError),

    #[error("failed to execute template {name:?}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Parsed templates, built on first use.
pub struct TemplateSet {
    source: Arc<dyn TemplateSource>,
    ready: OnceLock<Arc<Environment<'static>>>,
    build: SingleFlight,
}

impl TemplateSet {
    pub fn new(source: Arc<dyn TemplateSource>) -> Self {
        Self {
            source,
            ready: OnceLock::new(),
            build: SingleFlight::new(),
        }
    }

    /// Return the parsed templates, building them if this is the first
    /// successful call.
    pub async fn get(&self) -> Result<Arc<Environment<'static>>, TemplateError> {
        loop {
            let seen = self.build.epoch();
            if let Some(env) = self.ready.get() {
                return Ok(Arc::clone(env));
            }

            // A successful build populates `ready`, so the next pass returns.
            self.build.run(seen, || self.build_env()).await?;
        }
    }

    async fn build_env(&self) -> anyhow::Result<()> {
        let source = Arc::clone(&self.source);
        let files = tokio::task::spawn_blocking(move || source.load())
            .await
            .context("template loader panicked")??;
        anyhow::ensure!(!files.is_empty(), "no templates found");

        let mut env = Environment::new();
        minijinja_contrib::add_to_environment(&mut env);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        for file in files {
            info!(file = %file.name, "found");
            let name = file.name.clone();
            env.add_template_owned(file.name, file.source)
                .with_context(|| format!("failed to parse template {name:?}"))?;
        }

        let _ = self.ready.set(Arc::new(env));
        Ok(())
    }
}

/// Render the template for report `name` (`<name>.tmpl`) against `data`.
pub fn render<S: Serialize>(
    env: &Environment<'_>,
    name: &str,
    data: S,
) -> Result<String, TemplateError> {
    let file = format!("{name}.{TEMPLATE_EXTENSION}");
    env.get_template(&file)
        .and_then(|template| template.render(data))
        .map_err(|source| TemplateError::Render { name: file, source })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use serde_json::json;

    use super::*;

    /// In-memory source that counts loads and can fail its first N loads.
    pub(crate) struct StaticSource {
        files: Vec<(&'static str, &'static str)>,
        fail_first: usize,
        delay: Duration,
        pub(crate) loads: AtomicUsize,
    }

    impl StaticSource {
        pub(crate) fn new(files: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                files,
                fail_first: 0,
                delay: Duration::ZERO,
                loads: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_first(mut self, n: usize) -> Self {
            self.fail_first = n;
            self
        }

        pub(crate) fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl TemplateSource for StaticSource {
        fn load(&self) -> anyhow::Result<Vec<TemplateFile>> {
            std::thread::sleep(self.delay);
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(n >= self.fail_first, "asset store unavailable");
            Ok(self
                .files
                .iter()
                .map(|(name, source)| TemplateFile {
                    name: (*name).to_owned(),
                    source: (*source).to_owned(),
                })
                .collect())
        }
    }

    // -----------------------------------------------------------------------
    // TemplateSet
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn builds_once_and_reuses_the_environment() {
        let source = Arc::new(StaticSource::new(vec![("a.tmpl", "A")]));
        let set = TemplateSet::new(source.clone());

        let first = set.get().await.unwrap();
        let second = set.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_trigger_one_build() {
        let source = Arc::new(
            StaticSource::new(vec![("a.tmpl", "A")]).slow(Duration::from_millis(50)),
        );
        let set = TemplateSet::new(source.clone());

        let results = futures_util::future::join_all((0..8).map(|_| set.get())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_retried_on_next_request() {
        let source = Arc::new(StaticSource::new(vec![("a.tmpl", "A")]).failing_first(1));
        let set = TemplateSet::new(source.clone());

        let err = set.get().await.unwrap_err();
        assert!(err.to_string().contains("asset store unavailable"), "got: {err}");

        assert!(set.get().await.is_ok());
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn parse_error_names_the_offending_file() {
        let source = Arc::new(StaticSource::new(vec![("broken.tmpl", "{% if %}")]));
        let err = TemplateSet::new(source).get().await.unwrap_err();
        assert!(err.to_string().contains("broken.tmpl"), "got: {err}");
    }

    #[tokio::test]
    async fn empty_source_is_an_error() {
        let source = Arc::new(StaticSource::new(vec![]));
        let err = TemplateSet::new(source).get().await.unwrap_err();
        assert!(err.to_string().contains("no templates found"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // render
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn render_executes_named_template() {
        let source = Arc::new(StaticSource::new(vec![
            ("rack-usage.tmpl", "Hosts: {{ hosts }}"),
            ("wrapper.tmpl", "[{% include \"rack-usage.tmpl\" %}]"),
        ]));
        let env = TemplateSet::new(source).get().await.unwrap();

        assert_eq!(render(&env, "rack-usage", json!({ "hosts": 3 })).unwrap(), "Hosts: 3");
        assert_eq!(render(&env, "wrapper", json!({ "hosts": 3 })).unwrap(), "[Hosts: 3]");
    }

    #[tokio::test]
    async fn render_does_not_html_escape() {
        let source = Arc::new(StaticSource::new(vec![("raw.tmpl", "{{ cell }}")]));
        let env = TemplateSet::new(source).get().await.unwrap();
        assert_eq!(render(&env, "raw", json!({ "cell": "<td>" })).unwrap(), "<td>");
    }

    #[tokio::test]
    async fn render_exposes_helper_library() {
        let source = Arc::new(StaticSource::new(vec![(
            "summary.tmpl",
            "{{ zone.upper() }}: {{ hosts }} host{{ hosts|pluralize }}, {{ racks|length }} rack{{ racks|length|pluralize }}",
        )]));
        let env = TemplateSet::new(source).get().await.unwrap();

        let page = render(
            &env,
            "summary",
            json!({ "zone": "us-east", "hosts": 3, "racks": ["r1"] }),
        )
        .unwrap();
        assert_eq!(page, "US-EAST: 3 hosts, 1 rack");
    }

    #[tokio::test]
    async fn render_missing_template_names_it() {
        let source = Arc::new(StaticSource::new(vec![("a.tmpl", "A")]));
        let env = TemplateSet::new(source).get().await.unwrap();

        let err = render(&env, "unknown", json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown.tmpl"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // DirectorySource
    // -----------------------------------------------------------------------

    #[test]
    fn directory_source_reads_only_tmpl_files() {
        let dir = std::env::temp_dir().join(format!("mops-templates-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("b.tmpl"), "B").unwrap();
        std::fs::write(dir.join("a.tmpl"), "A").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.join("nested").join("c.tmpl"), "ignored").unwrap();

        let files = DirectorySource::new(&dir).load().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.tmpl", "b.tmpl"]);
        assert_eq!(files[0].source, "A");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn directory_source_errors_on_missing_dir() {
        let err = DirectorySource::new("/definitely/not/a/template/dir")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("reading template dir"), "got: {err}");
    }
}
