//! Analysis relay: content digest, cache, single-flight upstream call, audit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use glimpse_core::{AnalysisRecord, AuditEntry, ContentDigest, content_digest};
use glimpse_logging::abbreviate_image_ref;
use glimpse_store::{AuditLog, CacheStore};
use glimpse_understanding::VisionProvider;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    Cache,
    Upstream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub digest: ContentDigest,
    pub content: String,
    pub source: AnalysisSource,
}

/// Per-digest lock plus the number of requests holding or queued on it.
struct FlightSlot {
    lock: Arc<AsyncMutex<()>>,
    holders: usize,
}

type FlightMap = Mutex<HashMap<ContentDigest, FlightSlot>>;

pub struct AnalysisRelay {
    provider: Arc<dyn VisionProvider>,
    cache: CacheStore,
    audit: AuditLog,
    audit_cache_hits: bool,
    flights: FlightMap,
}

impl AnalysisRelay {
    pub fn new(provider: Arc<dyn VisionProvider>, cache: CacheStore, audit: AuditLog) -> Self {
        Self {
            provider,
            cache,
            audit,
            audit_cache_hits: true,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Whether requests served from cache are audited too. On by default.
    pub fn with_audit_cache_hits(mut self, enabled: bool) -> Self {
        self.audit_cache_hits = enabled;
        self
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Analyze an image reference, calling upstream at most once per digest.
    ///
    /// Concurrent requests for one digest queue behind the first; they find
    /// its result in the cache once it finishes.
    pub async fn analyze(&self, image_ref: &str) -> Result<Analysis, RelayError> {
        let digest = content_digest(image_ref);
        if let Some(hit) = self.lookup(&digest).await? {
            return Ok(hit);
        }

        let _flight = self.enter_flight(&digest).await;
        if let Some(hit) = self.lookup(&digest).await? {
            return Ok(hit);
        }

        info!(
            %digest,
            src = %abbreviate_image_ref(image_ref),
            provider = self.provider.name(),
            "Cache miss; requesting analysis"
        );
        let analysis = self
            .provider
            .describe(image_ref)
            .await
            .map_err(|e| RelayError::Upstream(format!("{e:#}")))?;

        // Audit first: a cached record must never exist without its entry.
        let record = AnalysisRecord::new(image_ref, analysis.content, analysis.response);
        self.audit.append(AuditEntry::from(&record)).await?;
        self.cache.put(&record).await?;

        Ok(Analysis {
            digest,
            content: record.content,
            source: AnalysisSource::Upstream,
        })
    }

    async fn lookup(&self, digest: &ContentDigest) -> Result<Option<Analysis>, RelayError> {
        let Some(record) = self.cache.get(digest).await? else {
            return Ok(None);
        };
        debug!(%digest, "Serving analysis from cache");
        if self.audit_cache_hits {
            self.audit.append(AuditEntry::from(&record)).await?;
        }
        Ok(Some(Analysis {
            digest: record.digest,
            content: record.content,
            source: AnalysisSource::Cache,
        }))
    }

    async fn enter_flight(&self, digest: &ContentDigest) -> Flight<'_> {
        let lock = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = flights.entry(digest.clone()).or_insert_with(|| FlightSlot {
                lock: Arc::default(),
                holders: 0,
            });
            slot.holders += 1;
            Arc::clone(&slot.lock)
        };
        // Registered before the await, so a caller cancelled while queued
        // still releases its slot.
        let mut flight = Flight {
            flights: &self.flights,
            digest: digest.clone(),
            guard: None,
        };
        flight.guard = Some(lock.lock_owned().await);
        flight
    }

    #[cfg(test)]
    fn flights_len(&self) -> usize {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// One request's claim on a digest, queued or holding the lock. Dropping it
/// releases the lock and forgets the slot once no claims remain.
struct Flight<'a> {
    flights: &'a FlightMap,
    digest: ContentDigest,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = flights.get_mut(&self.digest) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                flights.remove(&self.digest);
            }
        }
    }
}
