use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod backend;
mod config;
mod error;
mod flight;
mod report;

pub use config::Config;
pub use error::AppError;

use backend::BackendClient;
use config::{LogFormat, LoggingConfig};
use report::{DirectorySource, Reporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("MOPS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/mopsd/config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_tracing(&config.logging);
    api::recovery::install_panic_hook();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        backend = %config.backend.address,
        "Starting Metal Operations Server"
    );

    let client = Arc::new(BackendClient::new(&config.backend)?);
    client
        .authorize()
        .await
        .context("initial backend authorization failed")?;

    let reporter = Arc::new(Reporter::new(
        Arc::clone(&client),
        Arc::new(DirectorySource::new(&config.templates.dir)),
    ));

    let app = api::router(
        reporter,
        client,
        config.server.default_content_type()?,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "report API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("report API server error")?;

    info!("shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level; both fall back to info for
/// this crate.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        logging
            .level
            .as_deref()
            .unwrap_or("mops_gateway=info")
            .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
