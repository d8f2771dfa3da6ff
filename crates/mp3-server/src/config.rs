//! Configuration: a JSON file with command-line overrides

use crate::error::{Mp3ServerError, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_FILES_DIR: &str = "./files";
const DEFAULT_DIR_SIZE_MAX_MB: u64 = 200;
const DEFAULT_EXEC_PATH: &str = "yt-dlp";

/// Command-line arguments. Anything given here wins over the config file.
#[derive(Debug, Clone, Parser)]
#[command(name = "mp3-server", about = "Download and host mp3s from video URLs")]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(short = 'c', long = "config", default_value = "config.json")]
    pub config: PathBuf,

    /// Port to serve on
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Directory where files are hosted
    #[arg(short = 'd', long)]
    pub files_dir: Option<PathBuf>,

    /// Maximum size of the hosted directory, in megabytes
    #[arg(short = 'm', long)]
    pub dir_size_max_mb: Option<u64>,

    /// Path of the yt-dlp executable
    #[arg(short = 'e', long)]
    pub exec_path: Option<PathBuf>,

    /// Public base URL used in responses instead of the request Host header
    #[arg(long)]
    pub public_url: Option<String>,
}

/// Existing config files quote the port, so accept both forms
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

/// Contents of the JSON config file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    port: Option<PortValue>,
    files_dir: Option<PathBuf>,
    #[serde(rename = "dirSizeMaxMB")]
    dir_size_max_mb: Option<u64>,
    #[serde(alias = "execDir")]
    exec_path: Option<PathBuf>,
    public_url: Option<String>,
    max_evictions_per_pass: Option<usize>,
}

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub files_dir: PathBuf,
    pub budget_bytes: u64,
    pub exec_path: PathBuf,
    pub public_url: Option<String>,
    pub max_evictions_per_pass: usize,
}

impl Config {
    /// Read the config file named by `cli` and apply the CLI overrides
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = read_file_config(&cli.config)?;
        Self::resolve(file, cli)
    }

    fn resolve(file: FileConfig, cli: &Cli) -> Result<Self> {
        let port = match (cli.port, file.port) {
            (Some(port), _) => port,
            (None, Some(PortValue::Number(port))) => port,
            (None, Some(PortValue::Text(text))) => text.trim().parse().map_err(|_| {
                Mp3ServerError::Config(format!("invalid port {:?}", text))
            })?,
            (None, None) => {
                return Err(Mp3ServerError::Config(
                    "port must be set in the config file or with -p".to_string(),
                ))
            }
        };

        let dir_size_max_mb = cli
            .dir_size_max_mb
            .or(file.dir_size_max_mb)
            .unwrap_or(DEFAULT_DIR_SIZE_MAX_MB);

        Ok(Self {
            port,
            files_dir: cli
                .files_dir
                .clone()
                .or(file.files_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR)),
            budget_bytes: dir_size_max_mb.saturating_mul(1024 * 1024),
            exec_path: cli
                .exec_path
                .clone()
                .or(file.exec_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXEC_PATH)),
            public_url: cli
                .public_url
                .clone()
                .or(file.public_url)
                .map(|url| url.trim_end_matches('/').to_string()),
            max_evictions_per_pass: file.max_evictions_per_pass.unwrap_or(1),
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Mp3ServerError::Config(format!("error opening config file {:?}: {}", path, e))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        Mp3ServerError::Config(format!("error decoding config file {:?}: {}", path, e))
    })
}
