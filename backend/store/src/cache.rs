//! Content-addressed analysis cache: one JSON file per digest.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glimpse_core::{AnalysisRecord, ContentDigest};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::fs::write_atomic;

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, digest: &ContentDigest) -> PathBuf {
        self.dir.join(format!("{digest}.json"))
    }

    /// Look up a record. A missing or unreadable record is a miss.
    pub async fn get(&self, digest: &ContentDigest) -> Result<Option<AnalysisRecord>, StoreError> {
        let path = self.path_for(digest);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        match serde_json::from_slice::<AnalysisRecord>(&raw) {
            Ok(record) if record.digest == *digest => {
                debug!(%digest, "Cache hit");
                Ok(Some(record))
            }
            Ok(record) => {
                warn!(%digest, stored = %record.digest, "Cache record digest mismatch; ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache record; ignoring");
                Ok(None)
            }
        }
    }

    /// Store a record under its digest. A concurrent writer for the same
    /// digest may replace it; the file is always one complete record.
    pub async fn put(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.digest);
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StoreError::serde(&path, e))?;
        write_atomic(&path, &bytes).await?;
        debug!(digest = %record.digest, path = %path.display(), "Cache record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glimpse_core::content_digest;

    fn record(url: &str, content: &str) -> AnalysisRecord {
        AnalysisRecord::new(url, content, serde_json::json!({ "choices": [] }))
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cached_responses"));
        let digest = content_digest("https://img/1.jpg");

        assert!(store.get(&digest).await.unwrap().is_none());
        store.put(&record("https://img/1.jpg", "a cat")).await.unwrap();

        let hit = store.get(&digest).await.unwrap().unwrap();
        assert_eq!(hit.content, "a cat");
        assert_eq!(hit.image_url, "https://img/1.jpg");
        assert!(store.path_for(&digest).exists());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let digest = content_digest("x");
        std::fs::write(store.path_for(&digest), b"{ not json").unwrap();
        assert!(store.get(&digest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_under_wrong_name_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let other = record("y", "dog");
        let bytes = serde_json::to_vec(&other).unwrap();
        let digest = content_digest("x");
        std::fs::write(store.path_for(&digest), bytes).unwrap();
        assert!(store.get(&digest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn racing_writers_leave_one_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::new(dir.path()));
        let writes = (0..16).map(|i| {
            let store = Arc::clone(&store);
            async move { store.put(&record("same", &format!("take {i}"))).await }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let hit = store.get(&content_digest("same")).await.unwrap().unwrap();
        assert!(hit.content.starts_with("take "));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
