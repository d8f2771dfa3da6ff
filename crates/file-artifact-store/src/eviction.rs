//! Size-budget eviction
//!
//! The budget is only checked after an artifact has been added, so the store
//! can sit above it by up to one artifact between additions.

use crate::error::{Result, StoreError};
use crate::store::ArtifactStore;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Evicts the oldest artifacts once the store grows past its budget
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Maximum total size of the store in bytes
    budget_bytes: u64,
    /// Upper bound on deletions during one [`enforce`](Self::enforce) call
    max_evictions_per_pass: usize,
}

impl EvictionPolicy {
    /// A policy that removes at most one artifact per pass
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes,
            max_evictions_per_pass: 1,
        }
    }

    /// Allow up to `max` deletions per pass. Zero is treated as one.
    pub fn with_max_evictions_per_pass(mut self, max: usize) -> Self {
        self.max_evictions_per_pass = max.max(1);
        self
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn max_evictions_per_pass(&self) -> usize {
        self.max_evictions_per_pass
    }

    /// Remove the oldest artifact if the store is strictly over budget.
    ///
    /// Removes at most one file, even when the store is still over budget
    /// afterwards. Returns the removed path, or `None` when within budget.
    pub async fn maybe_evict(&self, store: &ArtifactStore) -> Result<Option<PathBuf>> {
        let total_size = store.total_size().await?;
        if total_size <= self.budget_bytes {
            return Ok(None);
        }

        let oldest = store.oldest().await?;
        info!(
            total_size,
            budget_bytes = self.budget_bytes,
            path = ?oldest,
            "Store over budget, evicting oldest artifact"
        );
        store.remove(&oldest).await?;
        Ok(Some(oldest))
    }

    /// Run up to `max_evictions_per_pass` single-step evictions, stopping as
    /// soon as the store is within budget.
    ///
    /// Errors are logged and swallowed; the returned list holds whatever was
    /// removed before the pass stopped.
    pub async fn enforce(&self, store: &ArtifactStore) -> Vec<PathBuf> {
        let mut evicted = Vec::new();

        for _ in 0..self.max_evictions_per_pass {
            match self.maybe_evict(store).await {
                Ok(Some(path)) => evicted.push(path),
                Ok(None) => break,
                Err(StoreError::NoArtifacts) => {
                    warn!("Store over budget but holds no artifacts to evict");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Eviction pass failed");
                    break;
                }
            }
        }

        evicted
    }
}
