use serde::Deserialize;

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub worker_connections: u16,
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            worker_connections: 1024,
            log_level: "info".into(),
        }
    }
}

impl GlobalConfig {
    pub fn worker_connections(&self) -> u16 {
        self.worker_connections
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &GlobalConfig) {
        if self.worker_connections == 0 {
            self.worker_connections = defaults.worker_connections;
        }
        if self.log_level.is_empty() {
            self.log_level = defaults.log_level.clone();
        }
    }
}
