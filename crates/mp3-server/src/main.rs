//! mp3 server - download audio from video URLs and host it
//!
//! POST a video URL to /mp3 and get back a link under /files/. Downloads are
//! done by yt-dlp; the hosting directory is kept under a size budget by
//! evicting the oldest mp3 after each new download.

mod config;
mod error;
mod fetcher;
mod server;
mod types;

use crate::config::{Cli, Config};
use crate::error::Result;
use crate::fetcher::YtDlpFetcher;
use crate::server::{start_server, ServerState, SharedState};
use clap::Parser;
use file_artifact_store::{ArtifactStore, EvictionPolicy};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("mp3_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let cli = Cli::parse();
    let config =
        Config::load(&cli).inspect_err(|e| tracing::error!("Error getting config: {}", e))?;
    info!("Port: {}", config.port);
    info!("Files dir: {:?}", config.files_dir);
    info!("Max dir size: {} MB", config.budget_bytes / (1024 * 1024));
    info!("Downloader: {:?}", config.exec_path);

    let store = ArtifactStore::new(config.files_dir.clone(), "mp3");
    store.init().await?;

    let eviction = EvictionPolicy::new(config.budget_bytes)
        .with_max_evictions_per_pass(config.max_evictions_per_pass);
    let fetcher = Arc::new(YtDlpFetcher::new(config.exec_path.clone()));

    let state: SharedState = Arc::new(ServerState::new(
        store,
        eviction,
        fetcher,
        config.public_url.clone(),
    ));

    info!("Serving {:?} on HTTP port: {}", config.files_dir, config.port);
    start_server(state, config.port).await?;

    Ok(())
}
