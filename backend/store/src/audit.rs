//! Audit trail of every analysis, stored as a single JSON array.
//!
//! Appends rewrite the whole file. Writers are serialized through an async
//! mutex so that no two appends read the same snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glimpse_core::AuditEntry;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::fs::write_atomic;

pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry ever written, oldest first. A missing log is empty.
    pub async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        serde_json::from_slice(&raw).map_err(|e| StoreError::serde(&self.path, e))
    }

    /// Append one entry. Returns the new length of the log.
    ///
    /// A malformed existing log is an error rather than silently replaced.
    pub async fn append(&self, entry: AuditEntry) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.entries().await?;
        entries.push(entry);
        let bytes = serde_json::to_vec(&entries).map_err(|e| StoreError::serde(&self.path, e))?;
        write_atomic(&self.path, &bytes).await?;

        debug!(path = %self.path.display(), entries = entries.len(), "Audit entry written");
        Ok(entries.len())
    }
}
