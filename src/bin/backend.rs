#![forbid(unsafe_code)]

//! Axum server for the VidTube API.
//!
//! Settings come from flags, the environment and `.env` (see
//! `vidtube::config`). Everything lives under `DATA_ROOT`: the document
//! database, stored assets and the upload staging area.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidtube::{
    api::{self, AppState},
    config::{RuntimeOverrides, resolve_runtime_config},
};

#[derive(Debug, Parser)]
#[command(name = "vidtube-backend", about = "Video sharing API server")]
struct BackendArgs {
    /// Directory holding the database and stored assets.
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// Base URL used in stored asset references.
    #[arg(long, value_name = "URL")]
    public_url: Option<String>,
    /// Dotenv file to read settings from.
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

impl From<BackendArgs> for RuntimeOverrides {
    fn from(args: BackendArgs) -> Self {
        Self {
            data_root: args.data_root,
            port: args.port,
            host: args.host,
            public_url: args.public_url,
            env_path: args.env_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtube=info,backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = resolve_runtime_config(BackendArgs::parse().into())?;
    let state = AppState::from_config(&config)
        .await
        .context("initializing application state")?;
    let app = api::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding to {}:{}", config.host, config.port))?;
    let addr = listener.local_addr().context("reading listen address")?;
    info!(
        %addr,
        data_root = %config.data_root.display(),
        public_url = %config.public_url,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_overrides() {
        let args = BackendArgs::try_parse_from([
            "backend",
            "--data-root",
            "/srv/vidtube",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
            "--public-url=https://media.example.test",
            "--env-file",
            "/etc/vidtube.env",
        ])
        .unwrap();
        let overrides = RuntimeOverrides::from(args);
        assert_eq!(overrides.data_root, Some(PathBuf::from("/srv/vidtube")));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(
            overrides.public_url.as_deref(),
            Some("https://media.example.test")
        );
        assert_eq!(overrides.env_path, Some(PathBuf::from("/etc/vidtube.env")));
    }

    #[test]
    fn flags_are_optional() {
        let overrides = RuntimeOverrides::from(BackendArgs::try_parse_from(["backend"]).unwrap());
        assert!(overrides.data_root.is_none());
        assert!(overrides.port.is_none());
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(BackendArgs::try_parse_from(["backend", "--port", "99999"]).is_err());
        assert!(BackendArgs::try_parse_from(["backend", "--port=abc"]).is_err());
    }
}
