use std::sync::Arc;

use hoard_cache::{CacheManager, CacheStore, Clock, MemoryCacheStore, SystemClock};
use hoard_config::{CacheBackendKind, CacheConfig};
use tracing::info;

pub mod master;
pub mod worker;

pub use master::Master;
pub use worker::WorkerContext;

/// Build the store named by `[cache] backend`.
pub fn build_store(cfg: &CacheConfig, clock: Arc<dyn Clock>) -> Arc<dyn CacheStore> {
    match cfg.backend() {
        CacheBackendKind::Memory => {
            info!(
                target: "hoard::master",
                backend = "memory",
                max_entries = cfg.max_entries(),
                "Cache store initialized"
            );
            Arc::new(MemoryCacheStore::with_clock(cfg.max_entries(), clock))
        }
    }
}

/// Cache manager over the configured store, on the system clock.
pub fn build_cache(cfg: &CacheConfig) -> Arc<CacheManager> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(cfg, clock.clone());
    Arc::new(CacheManager::with_clock(store, clock))
}
