use serde::Deserialize;

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================

/// Storage backend behind the response cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// Maximum number of stored variants, 0 for no limit.
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
    /// How long an expired entry is kept before the sweeper drops it.
    pub sweep_grace_secs: u64,
    /// `POST` to this path clears the cache. Disabled when unset.
    pub admin_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            max_entries: 100,
            sweep_interval_secs: 60,
            sweep_grace_secs: 30,
            admin_path: None,
        }
    }
}

impl CacheConfig {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn backend(&self) -> CacheBackendKind {
        self.backend
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    pub fn sweep_grace_secs(&self) -> u64 {
        self.sweep_grace_secs
    }

    pub fn admin_path(&self) -> Option<&str> {
        self.admin_path.as_deref()
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &CacheConfig) {
        if self.sweep_interval_secs == 0 {
            self.sweep_interval_secs = defaults.sweep_interval_secs;
        }
        if self
            .admin_path
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.admin_path = None;
        }
    }
}
