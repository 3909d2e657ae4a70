use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    clock::{Clock, SystemClock},
    entry::CacheEntry,
    key::VariantKey,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected the operation: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Storage backend behind the cache. Keyed by URI; each URI holds at most one
/// entry per [`VariantKey`].
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Insert or replace the entry with the same URI and variant key.
    async fn add(&self, entry: Arc<CacheEntry>) -> Result<(), StoreError>;

    /// Every variant stored under `uri`, expired ones included.
    async fn get(&self, uri: &str) -> Result<Vec<Arc<CacheEntry>>, StoreError>;

    /// Drop every variant of `uri`, returning how many were removed.
    async fn remove(&self, uri: &str) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Drop entries that expired more than `grace_secs` before `now_secs`.
    async fn purge_expired(&self, now_secs: u64, grace_secs: u64) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// Position of one stored variant in eviction order.
type Slot = (u64, String, VariantKey);

/// Eviction order of a bounded store. Changed only while the shard guard of
/// the affected URI is held, so it always mirrors the map.
#[derive(Debug, Default)]
struct EvictionIndex {
    by_sequence: BTreeSet<Slot>,
    by_expiry: BTreeSet<(u64, Slot)>,
}

impl EvictionIndex {
    fn slot(entry: &CacheEntry) -> Slot {
        (entry.sequence(), entry.uri().to_string(), entry.key())
    }

    fn insert(&mut self, entry: &CacheEntry) {
        let slot = Self::slot(entry);
        self.by_expiry.insert((entry.expires_at_secs(), slot.clone()));
        self.by_sequence.insert(slot);
    }

    fn remove(&mut self, entry: &CacheEntry) {
        let slot = Self::slot(entry);
        self.by_expiry.remove(&(entry.expires_at_secs(), slot.clone()));
        self.by_sequence.remove(&slot);
    }

    /// The earliest expired entry if any has expired, else the least
    /// recently stored one.
    fn victim(&self, now_secs: u64) -> Option<Slot> {
        match self.by_expiry.first() {
            Some((expires_at, slot)) if *expires_at <= now_secs => Some(slot.clone()),
            _ => self.by_sequence.first().cloned(),
        }
    }
}

/// In-process store. `max_entries` of 0 means unbounded.
#[derive(Debug)]
pub struct MemoryCacheStore {
    inner: DashMap<String, HashMap<VariantKey, Arc<CacheEntry>>>,
    count: AtomicUsize,
    max_entries: usize,
    index: Option<Mutex<EvictionIndex>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: DashMap::new(),
            count: AtomicUsize::new(0),
            max_entries,
            index: (max_entries > 0).then(|| Mutex::new(EvictionIndex::default())),
            clock,
        }
    }

    fn index(&self) -> Option<MutexGuard<'_, EvictionIndex>> {
        self.index
            .as_ref()
            .map(|index| index.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Account for entries just taken out of the map. Call with the shard
    /// guard still held.
    fn forget<'a>(&self, entries: impl IntoIterator<Item = &'a Arc<CacheEntry>>) -> usize {
        let mut index = self.index();
        let mut forgotten = 0;
        for entry in entries {
            if let Some(index) = index.as_mut() {
                index.remove(entry);
            }
            forgotten += 1;
        }
        self.count.fetch_sub(forgotten, Ordering::SeqCst);
        forgotten
    }

    fn evict_if_full(&self) {
        if self.max_entries == 0 {
            return;
        }
        while self.count.load(Ordering::SeqCst) > self.max_entries {
            let now = self.clock.now_secs();
            let Some((sequence, uri, key)) = self.index().and_then(|index| index.victim(now)) else {
                break;
            };
            if self.remove_variant(&uri, &key, sequence) {
                tracing::debug!(target: "hoard::cache", uri = %uri, sequence, "evicted entry");
            }
        }
    }

    /// Remove the variant under `key` if it is still the one stored with
    /// `sequence`.
    fn remove_variant(&self, uri: &str, key: &VariantKey, sequence: u64) -> bool {
        let mut removed = false;
        self.inner.remove_if_mut(uri, |_, variants| {
            if variants.get(key).is_some_and(|entry| entry.sequence() == sequence) {
                if let Some(entry) = variants.remove(key) {
                    removed = self.forget([&entry]) == 1;
                }
            }
            variants.is_empty()
        });
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn add(&self, entry: Arc<CacheEntry>) -> Result<(), StoreError> {
        {
            let mut variants = self.inner.entry(entry.uri().to_string()).or_default();
            let previous = variants.insert(entry.key(), entry.clone());
            if let Some(mut index) = self.index() {
                if let Some(previous) = &previous {
                    index.remove(previous);
                }
                index.insert(&entry);
            }
            if previous.is_none() {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.evict_if_full();
        Ok(())
    }

    async fn get(&self, uri: &str) -> Result<Vec<Arc<CacheEntry>>, StoreError> {
        Ok(self
            .inner
            .get(uri)
            .map(|variants| variants.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, uri: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.inner.remove_if(uri, |_, variants| {
            removed = self.forget(variants.values());
            true
        });
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.retain(|_, variants| {
            self.forget(variants.values());
            false
        });
        Ok(())
    }

    async fn purge_expired(&self, now_secs: u64, grace_secs: u64) -> Result<usize, StoreError> {
        let cutoff = now_secs.saturating_sub(grace_secs);
        let mut purged = 0;
        self.inner.retain(|_, variants| {
            let expired: Vec<VariantKey> = variants
                .iter()
                .filter(|(_, entry)| entry.is_expired(cutoff))
                .map(|(key, _)| key.clone())
                .collect();
            let dropped: Vec<_> = expired.iter().filter_map(|key| variants.remove(key)).collect();
            purged += self.forget(&dropped);
            !variants.is_empty()
        });
        Ok(purged)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.count.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        entry::tests::{entry, entry_with},
        key::VaryHeaders,
    };

    fn shared(e: CacheEntry) -> Arc<CacheEntry> {
        Arc::new(e)
    }

    #[tokio::test]
    async fn add_replaces_same_variant() {
        let store = MemoryCacheStore::default();
        store.add(shared(entry("/a", "text/plain", "v1", 0, 10))).await.unwrap();
        store.add(shared(entry("/a", "text/plain", "v2", 0, 10))).await.unwrap();
        store.add(shared(entry("/a", "text/html", "h1", 0, 10))).await.unwrap();

        let variants = store.get("/a").await.unwrap();
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().any(|e| e.etag() == "v2"));
        assert!(!variants.iter().any(|e| e.etag() == "v1"));
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn remove_drops_all_variants_of_uri() {
        let store = MemoryCacheStore::default();
        store.add(shared(entry("/a", "text/plain", "p", 0, 10))).await.unwrap();
        store.add(shared(entry("/a", "text/html", "h", 0, 10))).await.unwrap();
        store.add(shared(entry("/b", "text/plain", "b", 0, 10))).await.unwrap();

        assert_eq!(store.remove("/a").await.unwrap(), 2);
        assert!(store.get("/a").await.unwrap().is_empty());
        assert_eq!(store.get("/b").await.unwrap().len(), 1);
        assert_eq!(store.remove("/missing").await.unwrap(), 0);
        assert_eq!(store.len().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store.get("/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_returns_expired_entries() {
        let store = MemoryCacheStore::default();
        store.add(shared(entry("/a", "text/plain", "p", 0, 1))).await.unwrap();
        assert_eq!(store.get("/a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_respects_grace() {
        let store = MemoryCacheStore::default();
        store.add(shared(entry("/old", "text/plain", "o", 0, 10))).await.unwrap();
        store.add(shared(entry("/recent", "text/plain", "r", 93, 10))).await.unwrap();
        store.add(shared(entry("/fresh", "text/plain", "f", 100, 10))).await.unwrap();

        assert_eq!(store.purge_expired(105, 5).await.unwrap(), 1);
        assert!(store.get("/old").await.unwrap().is_empty());
        assert_eq!(store.get("/recent").await.unwrap().len(), 1);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryCacheStore::with_clock(2, clock);
        let none = VaryHeaders::new();
        store.add(shared(entry_with("/a", "text/plain", "a", 0, 10, none.clone(), 1))).await.unwrap();
        store.add(shared(entry_with("/b", "text/plain", "b", 0, 10, none.clone(), 2))).await.unwrap();
        store.add(shared(entry_with("/c", "text/plain", "c", 0, 10, none, 3))).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 2);
        assert!(store.get("/a").await.unwrap().is_empty());
        assert_eq!(store.get("/c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn evicts_expired_before_oldest() {
        let clock = Arc::new(ManualClock::new(50));
        let store = MemoryCacheStore::with_clock(2, clock);
        let none = VaryHeaders::new();
        store.add(shared(entry_with("/a", "text/plain", "a", 45, 100, none.clone(), 1))).await.unwrap();
        store.add(shared(entry_with("/b", "text/plain", "b", 0, 10, none.clone(), 2))).await.unwrap();
        store.add(shared(entry_with("/c", "text/plain", "c", 50, 10, none, 3))).await.unwrap();

        assert!(store.get("/b").await.unwrap().is_empty());
        assert_eq!(store.get("/a").await.unwrap().len(), 1);
        assert_eq!(store.get("/c").await.unwrap().len(), 1);
    }

    fn variant(i: u64, sequence: u64) -> Arc<CacheEntry> {
        let mut vary = VaryHeaders::new();
        vary.insert("x-test-vary".into(), vec![format!("v{}", i % 8)]);
        shared(entry_with("/hot", "text/plain", &format!("e{sequence}"), 0, 60, vary, sequence))
    }

    async fn stored_variants(store: &MemoryCacheStore) -> usize {
        let mut total = 0;
        for uri in ["/hot", "/cold"] {
            total += store.get(uri).await.unwrap().len();
        }
        total
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_and_removes_keep_count_exact() {
        let store = Arc::new(MemoryCacheStore::default());
        let mut tasks = Vec::new();

        for worker in 0..8u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..200u64 {
                    let sequence = worker * 1_000 + round;
                    store.add(variant(round, sequence)).await.unwrap();
                    if round % 17 == 0 {
                        store.remove("/hot").await.unwrap();
                    }
                    for entry in store.get("/hot").await.unwrap() {
                        assert_eq!(entry.uri(), "/hot");
                    }
                }
            }));
        }
        let cold = store.clone();
        tasks.push(tokio::spawn(async move {
            for sequence in 0..50 {
                cold.add(shared(entry_with("/cold", "text/html", "c", 0, 60, VaryHeaders::new(), sequence)))
                    .await
                    .unwrap();
            }
        }));
        for task in tasks {
            task.await.unwrap();
        }

        let hot = store.get("/hot").await.unwrap().len();
        assert!(hot <= 8);
        assert_eq!(store.get("/cold").await.unwrap().len(), 1);
        assert_eq!(store.len().await.unwrap(), stored_variants(&store).await);

        store.remove("/hot").await.unwrap();
        assert!(store.get("/hot").await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_of_one_variant_leave_one_entry() {
        let store = Arc::new(MemoryCacheStore::default());
        let mut tasks = Vec::new();
        for sequence in 1..=64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.add(variant(0, sequence)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let variants = store.get("/hot").await.unwrap();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].etag().starts_with('e'));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounded_store_stays_within_capacity_under_contention() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryCacheStore::with_clock(5, clock));
        let mut tasks = Vec::new();
        for worker in 0..4u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..100u64 {
                    let sequence = worker * 1_000 + round;
                    let uri = format!("/item/{}", sequence % 23);
                    store
                        .add(shared(entry_with(&uri, "text/plain", "x", 0, 60, VaryHeaders::new(), sequence)))
                        .await
                        .unwrap();
                    if round % 11 == 0 {
                        store.clear().await.unwrap();
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let len = store.len().await.unwrap();
        assert!(len <= 5);
        let mut actual = 0;
        for i in 0..23 {
            actual += store.get(&format!("/item/{i}")).await.unwrap().len();
        }
        assert_eq!(len, actual);
    }

    #[tokio::test]
    async fn eviction_follows_replacements() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryCacheStore::with_clock(2, clock);
        let none = VaryHeaders::new();
        store.add(shared(entry_with("/a", "text/plain", "a1", 0, 10, none.clone(), 1))).await.unwrap();
        store.add(shared(entry_with("/b", "text/plain", "b", 0, 10, none.clone(), 2))).await.unwrap();
        // replacing /a makes /b the oldest
        store.add(shared(entry_with("/a", "text/plain", "a2", 0, 10, none.clone(), 3))).await.unwrap();
        store.add(shared(entry_with("/c", "text/plain", "c", 0, 10, none, 4))).await.unwrap();

        assert!(store.get("/b").await.unwrap().is_empty());
        assert_eq!(store.get("/a").await.unwrap()[0].etag(), "a2");
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[test]
    fn retryable_errors() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::Rejected("too big".into()).is_retryable());
    }
}
