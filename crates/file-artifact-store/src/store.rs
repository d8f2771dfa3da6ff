//! Directory-backed artifact storage
//!
//! Every query rescans the directory. Size and age are never cached, which
//! keeps the store crash-safe at the cost of O(n) work per call.

use crate::error::{Result, StoreError};
use crate::types::{ArtifactEntry, StoreStats};
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Subdirectory of the store root holding artifacts that are still being
/// written. Files here are never reported by [`ArtifactStore::oldest`].
pub const STAGING_DIR: &str = ".incoming";

/// A flat directory of immutable `{id}.{ext}` files
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// Directory where artifacts are stored
    root: PathBuf,
    /// Artifact file extension, without the leading dot
    extension: String,
}

impl ArtifactStore {
    /// Create a store rooted at `root` holding `*.{extension}` artifacts
    pub fn new(root: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            root,
            extension: extension.into(),
        }
    }

    /// Ensure the store and staging directories exist
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.staging_dir()).await?;
        info!(root = ?self.root, "Artifact store initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{id}.{ext}`
    pub fn file_name(&self, id: &str) -> String {
        format!("{}.{}", id, self.extension)
    }

    /// Final location of the artifact for `id`. Does not imply existence.
    pub fn path(&self, id: &str) -> PathBuf {
        self.root.join(self.file_name(id))
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Where a producer should write the artifact for `id` before
    /// [`commit`](Self::commit) moves it into place
    pub fn staging_path(&self, id: &str) -> PathBuf {
        self.staging_dir().join(self.file_name(id))
    }

    /// Whether the artifact for `id` is present. Stat failures other than
    /// "not found" are logged and reported as absent.
    pub async fn exists(&self, id: &str) -> bool {
        let path = self.path(id);
        match fs::metadata(&path).await {
            Ok(_) => {
                debug!(path = ?path, "Artifact exists");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "Artifact does not exist");
                false
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat artifact");
                false
            }
        }
    }

    /// Atomically move a staged artifact to its final path
    pub async fn commit(&self, id: &str) -> Result<PathBuf> {
        let staged = self.staging_path(id);
        let path = self.path(id);
        fs::rename(&staged, &path).await?;
        debug!(path = ?path, "Committed artifact");
        Ok(path)
    }

    /// Remove whatever a failed producer left in the staging directory.
    ///
    /// Downloaders leave side files next to the target (`{id}.mp3.part`,
    /// `{id}.webm`), so everything staged under `{id}.` goes.
    pub async fn discard_staged(&self, id: &str) {
        let staging = self.staging_dir();
        let prefix = format!("{}.", id);

        let mut read_dir = match fs::read_dir(&staging).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return,
            Err(e) => {
                warn!(dir = ?staging, error = %e, "Failed to list staging directory");
                return;
            }
        };

        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = ?staging, error = %e, "Failed to list staging directory");
                    break;
                }
            };
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = ?path, "Discarded staged file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to discard staged file"),
            }
        }
    }

    /// Sum of the sizes of every file under the root, recursively
    pub async fn total_size(&self) -> Result<u64> {
        let entries = self.scan().await?;
        Ok(entries.iter().map(|e| e.size).sum())
    }

    /// The committed artifact with the smallest modification time.
    ///
    /// Artifacts sharing a modification time are ordered by path, so the
    /// lexicographically smallest path wins a tie.
    pub async fn oldest(&self) -> Result<PathBuf> {
        let mut artifacts = self.artifacts().await?;
        artifacts.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });

        artifacts
            .into_iter()
            .next()
            .map(|e| e.path)
            .ok_or(StoreError::NoArtifacts)
    }

    /// Delete a file from the store
    pub async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await?;
        debug!(path = ?path, "Removed artifact");
        Ok(())
    }

    /// Count and total size of the store
    pub async fn stats(&self) -> Result<StoreStats> {
        let entries = self.scan().await?;
        let total_size = entries.iter().map(|e| e.size).sum();
        let artifacts = entries.iter().filter(|e| self.is_artifact(&e.path)).count();
        Ok(StoreStats {
            artifacts,
            total_size,
        })
    }

    /// Committed artifacts only: right extension, outside the staging directory
    async fn artifacts(&self) -> Result<Vec<ArtifactEntry>> {
        let entries = self.scan().await?;
        Ok(entries
            .into_iter()
            .filter(|e| self.is_artifact(&e.path))
            .collect())
    }

    fn is_artifact(&self, path: &Path) -> bool {
        path.extension() == Some(OsStr::new(&self.extension))
            && !path.starts_with(self.staging_dir())
    }

    /// Walk the whole tree under the root, collecting every regular file
    async fn scan(&self) -> Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    // Deleted between listing and stat
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };

                if metadata.is_dir() {
                    pending.push(entry.path());
                    continue;
                }

                let modified_at: DateTime<Utc> = metadata.modified()?.into();
                entries.push(ArtifactEntry {
                    path: entry.path(),
                    size: metadata.len(),
                    modified_at,
                });
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn write_with_mtime(path: &Path, data: &[u8], secs_ago: u64) {
        std::fs::write(path, data).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    async fn test_store(dir: &Path) -> ArtifactStore {
        let store = ArtifactStore::new(dir.to_path_buf(), "mp3");
        store.init().await.unwrap();
        store
    }

    #[test]
    fn test_path_is_deterministic() {
        let store = ArtifactStore::new(PathBuf::from("/srv/files"), "mp3");
        assert_eq!(store.path("abc123"), PathBuf::from("/srv/files/abc123.mp3"));
        assert_eq!(
            store.staging_path("abc123"),
            PathBuf::from("/srv/files/.incoming/abc123.mp3")
        );
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        assert!(!store.exists("abc123").await);
        std::fs::write(store.path("abc123"), b"audio").unwrap();
        assert!(store.exists("abc123").await);
    }

    #[tokio::test]
    async fn test_staged_file_is_not_visible_until_committed() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        std::fs::write(store.staging_path("abc123"), b"partial").unwrap();
        assert!(!store.exists("abc123").await);

        let path = store.commit("abc123").await.unwrap();
        assert_eq!(path, store.path("abc123"));
        assert!(store.exists("abc123").await);
        assert!(!store.staging_path("abc123").exists());
    }

    #[tokio::test]
    async fn test_commit_without_staged_file_fails() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let result = store.commit("missing").await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_discard_staged() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let staging = dir.path().join(STAGING_DIR);
        std::fs::write(store.staging_path("abc123"), b"partial").unwrap();
        std::fs::write(staging.join("abc123.mp3.part"), b"partial").unwrap();
        std::fs::write(staging.join("abc123.webm"), b"video").unwrap();
        std::fs::write(staging.join("abc1234.mp3.part"), b"other").unwrap();

        store.discard_staged("abc123").await;

        assert!(!store.staging_path("abc123").exists());
        assert!(!staging.join("abc123.mp3.part").exists());
        assert!(!staging.join("abc123.webm").exists());
        // A different id sharing the prefix is left alone
        assert!(staging.join("abc1234.mp3.part").exists());
        assert_eq!(store.total_size().await.unwrap(), 5);

        // Nothing staged is fine too
        store.discard_staged("abc123").await;
    }

    #[tokio::test]
    async fn test_total_size_walks_whole_tree() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        std::fs::write(store.path("a"), b"0123456789").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"abc").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.mp3"), b"12345").unwrap();

        assert_eq!(store.total_size().await.unwrap(), 18);
    }

    #[tokio::test]
    async fn test_total_size_missing_root() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("does-not-exist"), "mp3");

        let result = store.total_size().await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_oldest_picks_minimum_mtime() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        write_with_mtime(&store.path("a"), b"a", 300);
        write_with_mtime(&store.path("b"), b"b", 200);
        write_with_mtime(&store.path("c"), b"c", 100);

        assert_eq!(store.oldest().await.unwrap(), store.path("a"));
    }

    #[tokio::test]
    async fn test_oldest_ignores_other_extensions_and_staging() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        write_with_mtime(&dir.path().join("old.txt"), b"x", 1000);
        write_with_mtime(&store.staging_path("partial"), b"x", 900);
        write_with_mtime(&store.path("b"), b"b", 10);

        assert_eq!(store.oldest().await.unwrap(), store.path("b"));
    }

    #[tokio::test]
    async fn test_oldest_tie_breaks_by_path() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let mtime = SystemTime::now() - Duration::from_secs(60);
        for id in ["zeta", "alpha", "mid"] {
            let path = store.path(id);
            std::fs::write(&path, b"x").unwrap();
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }

        assert_eq!(store.oldest().await.unwrap(), store.path("alpha"));
    }

    #[tokio::test]
    async fn test_oldest_empty_store() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let result = store.oldest().await;
        assert!(matches!(result, Err(StoreError::NoArtifacts)));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let path = store.path("a");
        std::fs::write(&path, b"a").unwrap();
        store.remove(&path).await.unwrap();
        assert!(!path.exists());

        // Already gone
        let result = store.remove(&path).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path()).await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.artifacts, 0);
        assert_eq!(stats.total_size, 0);

        std::fs::write(store.path("a"), b"test data").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.artifacts, 1);
        assert_eq!(stats.total_size, 11);
    }
}
