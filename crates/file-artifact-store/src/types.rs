//! Store types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A file found while scanning the store
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// Point-in-time view of the store, computed by a directory scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub artifacts: usize,
    pub total_size: u64,
}
