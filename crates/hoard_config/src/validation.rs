use std::net::SocketAddr;

use crate::HoardConfig;

/// Validation output for a loaded configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    /// Returns true when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true when at least one error was found.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the collected warning messages.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the collected error messages.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a configuration and return a report of issues.
pub fn validate(cfg: &HoardConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_global(cfg, &mut report);
    validate_http(cfg, &mut report);
    validate_cache(cfg, &mut report);

    report
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

fn validate_global(cfg: &HoardConfig, report: &mut ConfigReport) {
    let level = cfg.global.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        report.warn(format!(
            "global.log_level '{level}' is not a known level; tracing may reject it",
            level = cfg.global.log_level
        ));
    }
}

fn validate_http(cfg: &HoardConfig, report: &mut ConfigReport) {
    let listen = cfg.http.listen.trim();
    if listen.is_empty() {
        report.error("http.listen is empty");
    } else if listen.parse::<SocketAddr>().is_err() {
        report.warn(format!(
            "http.listen '{listen}' is not a socket address; DNS resolution will be used"
        ));
    }
}

fn validate_cache(cfg: &HoardConfig, report: &mut ConfigReport) {
    let cache = &cfg.cache;
    if !cache.enabled {
        report.warn("cache.enabled is false; every request goes to the handler");
    }

    if cache.max_entries == 0 {
        report.warn("cache.max_entries is 0; the cache is unbounded");
    }

    if cache.sweep_grace_secs > cache.sweep_interval_secs.saturating_mul(100) {
        report.warn(format!(
            "cache.sweep_grace_secs ({grace}) is far larger than sweep_interval_secs ({interval}); expired entries will linger",
            grace = cache.sweep_grace_secs,
            interval = cache.sweep_interval_secs
        ));
    }

    if let Some(path) = cache.admin_path.as_deref() {
        if !path.starts_with('/') {
            report.error(format!("cache.admin_path '{path}' must start with '/'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let report = HoardConfig::default().validate();
        assert!(report.is_ok(), "{}", report.format());
    }

    #[test]
    fn bad_admin_path_is_an_error() {
        let mut cfg = HoardConfig::default();
        cfg.cache.admin_path = Some("clear".into());
        let report = cfg.validate();
        assert!(report.has_errors());
        assert!(report.format().contains("admin_path"));
    }

    #[test]
    fn empty_listen_is_an_error() {
        let mut cfg = HoardConfig::default();
        cfg.http.listen = " ".into();
        assert!(cfg.validate().has_errors());
    }

    #[test]
    fn unbounded_cache_only_warns() {
        let mut cfg = HoardConfig::default();
        cfg.cache.max_entries = 0;
        let report = cfg.validate();
        assert!(report.is_ok());
        assert_eq!(report.warnings().len(), 1);
    }
}
