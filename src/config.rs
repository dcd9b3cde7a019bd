//! Configuration types for mopsd.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. Every section is optional; missing keys fall back
//! to the defaults below.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [backend]
//! address      = "https://metal.internal:9443"
//! username     = "reporter"
//! password_env = "MOPS_BACKEND_PASSWORD"
//!
//! [templates]
//! dir = "/usr/share/mopsd/reports"
//!
//! [logging]
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.port != 0, "[server] port must be non-zero");

        HeaderValue::from_str(&self.server.default_content_type).with_context(|| {
            format!(
                "[server] default_content_type `{}` is not a valid header value",
                self.server.default_content_type
            )
        })?;

        let address = self.backend.address.as_str();
        anyhow::ensure!(
            address.starts_with("http://") || address.starts_with("https://"),
            "[backend] address `{}` must be an http:// or https:// URL",
            address
        );

        anyhow::ensure!(
            !self.templates.dir.as_os_str().is_empty(),
            "[templates] dir must not be empty"
        );

        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port the report endpoint listens on (default: 8080).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Content type applied to responses whose handler did not set one
    /// (default: `text/plain; charset=utf-8`).
    #[serde(default = "defaults::content_type")]
    pub default_content_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            default_content_type: defaults::content_type(),
        }
    }
}

impl ServerConfig {
    /// The default content type as a header value. Validated at load time.
    pub fn default_content_type(&self) -> anyhow::Result<HeaderValue> {
        HeaderValue::from_str(&self.default_content_type)
            .context("invalid default_content_type header value")
    }
}

/// Connection and credentials for the metal backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the backend (default: `https://localhost:9443`).
    #[serde(default = "defaults::address")]
    pub address: String,

    /// Login name used for the credential exchange (default: `admin`).
    #[serde(default = "defaults::username")]
    pub username: String,

    /// Environment variable whose value is the login password.
    ///
    /// Leave unset to use the built-in `admin` password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Request timeout in milliseconds (default: 30 000).
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Skip TLS certificate verification when talking to the backend.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: defaults::address(),
            username: defaults::username(),
            password_env: None,
            timeout_ms: defaults::timeout_ms(),
            accept_invalid_certs: false,
        }
    }
}

impl BackendConfig {
    /// Resolve the password from the configured environment variable, falling
    /// back to the default when the variable is unset or empty.
    pub fn password(&self) -> String {
        self.password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(defaults::password)
    }
}

/// Where report templates are loaded from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplatesConfig {
    /// Directory containing `<report>.tmpl` files (default: `reports`).
    #[serde(default = "defaults::templates_dir")]
    pub dir: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: defaults::templates_dir(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset, e.g. `mops_gateway=debug`.
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single-line output.
    Text,
}

mod defaults {
    use std::path::PathBuf;

    pub fn port() -> u16 { 8080 }
    pub fn content_type() -> String { "text/plain; charset=utf-8".into() }
    pub fn address() -> String { "https://localhost:9443".into() }
    pub fn username() -> String { "admin".into() }
    pub fn password() -> String { "admin".into() }
    pub fn timeout_ms() -> u64 { 30_000 }
    pub fn templates_dir() -> PathBuf { PathBuf::from("reports") }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Parsing & validation
    // -----------------------------------------------------------------------

    #[test]
    fn parse_example_config() {
        let content = include_str!("../config.example.toml");
        let config: Config = toml::from_str(content).expect("example config should parse");
        config.validate().expect("example config should be valid");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        config.validate().expect("defaults should be valid");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.default_content_type, "text/plain; charset=utf-8");
        assert_eq!(config.backend.address, "https://localhost:9443");
        assert_eq!(config.backend.username, "admin");
        assert_eq!(config.backend.timeout_ms, 30_000);
        assert!(!config.backend.accept_invalid_certs);
        assert_eq!(config.templates.dir, PathBuf::from("reports"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn validation_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_http_backend_address() {
        let mut config = Config::default();
        config.backend.address = "metal.internal:9443".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_unprintable_content_type() {
        let mut config = Config::default();
        config.server.default_content_type = "text/plain\n".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_templates_dir() {
        let mut config = Config::default();
        config.templates.dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Password resolution
    // -----------------------------------------------------------------------

    #[test]
    fn password_defaults_when_env_field_is_none() {
        assert_eq!(BackendConfig::default().password(), "admin");
    }

    #[test]
    fn password_defaults_when_env_var_is_unset() {
        let cfg = BackendConfig {
            password_env: Some("MOPS_TEST_DEFINITELY_NOT_SET_XYZ_99".into()),
            ..Default::default()
        };
        assert_eq!(cfg.password(), "admin");
    }

    #[test]
    fn password_resolves_from_env_var() {
        // Use a unique var name to avoid cross-test interference.
        let var = "MOPS_CONFIG_TEST_PASSWORD_RESOLVE_123";
        // SAFETY: unique variable, not read by any other test.
        unsafe { std::env::set_var(var, "s3cret") };
        let cfg = BackendConfig {
            password_env: Some(var.into()),
            ..Default::default()
        };
        assert_eq!(cfg.password(), "s3cret");
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn log_format_deserializes_from_snake_case() {
        let logging: LoggingConfig = toml::from_str("format = \"text\"").unwrap();
        assert_eq!(logging.format, LogFormat::Text);
    }
}
