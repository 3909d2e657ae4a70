use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use http::HeaderMap;
use tokio::task::JoinHandle;

use crate::{
    clock::{Clock, SystemClock},
    entry::{CacheEntry, CachedHeaders, EntryParts},
    error::CacheError,
    key::VaryHeaders,
    media::{Accept, MediaType},
    negotiate::negotiate,
    policy::CacheDirectives,
    store::{CacheStore, MemoryCacheStore},
};

/// Front door to the cache: TTL bookkeeping and variant selection over a
/// pluggable [`CacheStore`].
#[derive(Debug)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

/// A response as handed to [`CacheManager::add`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub uri: String,
    pub media_type: MediaType,
    pub directives: CacheDirectives,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub etag: String,
    pub vary: VaryHeaders,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            sequence: AtomicU64::new(0),
        }
    }

    /// Unbounded in-memory cache on the given clock.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryCacheStore::with_clock(0, clock.clone()));
        Self::with_clock(store, clock)
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Store a response, replacing the variant with the same media type and
    /// vary snapshot. A missing max-age is treated as 0.
    pub async fn add(&self, new: NewEntry) -> Result<Arc<CacheEntry>, CacheError> {
        let max_age_secs = new.directives.max_age_secs.unwrap_or(0);
        let entry = Arc::new(CacheEntry::from_parts(EntryParts {
            headers: CachedHeaders::capture(&new.headers),
            uri: new.uri,
            media_type: new.media_type,
            body: new.body,
            etag: new.etag,
            max_age_secs,
            created_at_secs: self.now(),
            vary: new.vary,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        }));

        self.store
            .add(entry.clone())
            .await
            .map_err(|e| CacheError::store("add", entry.uri(), e))?;

        tracing::debug!(
            target: "hoard::cache",
            uri = %entry.uri(),
            media_type = %entry.media_type(),
            etag = %entry.etag(),
            max_age = max_age_secs,
            "stored entry"
        );
        Ok(entry)
    }

    /// The variant of `uri` that best fits the request, expired or not.
    pub async fn get(
        &self,
        uri: &str,
        accept: &Accept,
        request_headers: &HeaderMap,
    ) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        let candidates = self
            .store
            .get(uri)
            .await
            .map_err(|e| CacheError::store("get", uri, e))?;
        Ok(negotiate(candidates, accept, request_headers))
    }

    pub async fn remove(&self, uri: &str) -> Result<usize, CacheError> {
        let removed = self
            .store
            .remove(uri)
            .await
            .map_err(|e| CacheError::store("remove", uri, e))?;
        tracing::debug!(target: "hoard::cache", uri = %uri, removed, "invalidated");
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store
            .clear()
            .await
            .map_err(|e| CacheError::store("clear", "*", e))?;
        tracing::info!(target: "hoard::cache", "cache cleared");
        Ok(())
    }

    pub async fn purge_expired(&self, grace_secs: u64) -> Result<usize, CacheError> {
        self.store
            .purge_expired(self.now(), grace_secs)
            .await
            .map_err(|e| CacheError::store("purge", "*", e))
    }

    pub async fn len(&self) -> Result<usize, CacheError> {
        self.store
            .len()
            .await
            .map_err(|e| CacheError::store("len", "*", e))
    }

    /// Periodically drop entries expired for longer than `grace`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, grace: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.purge_expired(grace.as_secs()).await {
                    Ok(0) => {}
                    Ok(purged) => {
                        tracing::debug!(target: "hoard::cache", purged, "swept expired entries")
                    }
                    Err(e) => tracing::warn!(target: "hoard::cache", error = ?e, "sweep failed"),
                }
            }
        })
    }
}
