//! Audio download via an external yt-dlp process

use crate::error::FetchError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Produces an audio file at `dest` from a video URL
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Runs `yt-dlp <url> -x --audio-format <format> -o <dest>`
pub struct YtDlpFetcher {
    exec_path: PathBuf,
    audio_format: String,
}

impl YtDlpFetcher {
    pub fn new(exec_path: PathBuf) -> Self {
        Self {
            exec_path,
            audio_format: "mp3".to_string(),
        }
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        debug!(url, dest = ?dest, exec = ?self.exec_path, "Starting download");
        let started = Instant::now();

        let output = Command::new(&self.exec_path)
            .arg(url)
            .args(["-x", "--audio-format", &self.audio_format, "-o"])
            .arg(dest)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FetchError::Spawn(format!("{:?}: {}", self.exec_path, e)))?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
            warn!(
                url,
                status = ?output.status.code(),
                output = %diagnostic,
                "Downloader failed"
            );
            return Err(FetchError::Download {
                status: output.status.code(),
                output: diagnostic,
            });
        }

        info!(
            url,
            dest = ?dest,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Download complete"
        );
        Ok(())
    }
}
