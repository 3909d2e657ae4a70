use std::{sync::Arc, time::Duration};

use hoard_cache::Handler;
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::info;

use super::Master;

impl<H: Handler + 'static> Master<H> {
    pub(super) fn log_startup(&self) {
        info!(target: "hoard::master", "Starting HOARD MASTER");
        info!(
            target: "hoard::master",
            worker_connections = self.cfg.global.worker_connections,
            log_level = %self.cfg.global.log_level,
            cache_enabled = self.cfg.cache.enabled,
            "Global configuration loaded"
        );
    }

    pub(super) fn init_semaphore(&self) -> Arc<Semaphore> {
        let max_conns = self.cfg.global.worker_connections as usize;
        let semaphore = Arc::new(Semaphore::new(max_conns));
        info!(
            target: "hoard::master",
            max_conns,
            "Global connection semaphore initialized"
        );
        semaphore
    }

    /// Background purge of long-expired entries. Not started when the cache
    /// is disabled.
    pub(super) fn start_sweeper(&self) -> Option<JoinHandle<()>> {
        if !self.cfg.cache.enabled {
            return None;
        }
        let interval = Duration::from_secs(self.cfg.cache.sweep_interval_secs);
        let grace = Duration::from_secs(self.cfg.cache.sweep_grace_secs);
        info!(
            target: "hoard::master",
            interval_secs = interval.as_secs(),
            grace_secs = grace.as_secs(),
            "Expiry sweeper started"
        );
        Some(self.ctx.pipeline().cache().spawn_sweeper(interval, grace))
    }
}
