use serde::Deserialize;

use crate::validation::{ConfigReport, validate};
use crate::{CacheConfig, GlobalConfig, HttpConfig};

// =======================================================
// HOARD CONFIG: main config
// =======================================================
#[derive(Debug, Clone, Deserialize)]
pub struct HoardConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for HoardConfig {
    fn default() -> Self {
        let mut cfg = Self {
            global: GlobalConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
        };
        cfg.apply_defaults();
        cfg
    }
}

impl HoardConfig {
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn http(&self) -> &HttpConfig {
        &self.http
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Ini).required(false))
            .build()?;
        Self::from_config(built)
    }

    /// Parse INI text directly.
    pub fn from_ini_str(ini: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(ini, config::FileFormat::Ini))
            .build()?;
        Self::from_config(built)
    }

    fn from_config(built: config::Config) -> Result<Self, config::ConfigError> {
        let mut cfg: HoardConfig = built.try_deserialize()?;
        cfg.apply_defaults();
        Ok(cfg)
    }

    pub fn from_file_or_default(file_name: &str) -> Self {
        match Self::from_file(file_name) {
            Ok(cfg) => {
                let report = cfg.validate();
                if report.has_errors() {
                    eprintln!("⚠️  Invalid config in '{file_name}':");
                    eprintln!("{}", report.format());
                    eprintln!("➡️  Using default config(in-memory)...");
                    HoardConfig::default()
                } else {
                    if !report.warnings().is_empty() {
                        eprintln!("⚠️  Config warnings in '{file_name}':");
                        eprintln!("{}", report.format());
                    }
                    cfg
                }
            }
            Err(e) => {
                eprintln!("⚠️  Error reading config'{file_name}': {e}");
                eprintln!("➡️  Using default config(in-memory)...");
                HoardConfig::default()
            }
        }
    }

    fn apply_defaults(&mut self) {
        self.global.apply_defaults_from(&GlobalConfig::default());
        self.http.apply_defaults_from(&HttpConfig::default());
        self.cache.apply_defaults_from(&CacheConfig::default());
    }

    pub fn print(&self) {
        println!("================ HOARD CONFIG ================");
        println!("\n[global]");
        println!("  worker_connections   = {}", self.global.worker_connections);
        println!("  log_level            = {}", self.global.log_level);

        println!("\n[http]");
        println!("  listen               = {}", self.http.listen);
        println!("  keepalive            = {}", self.http.keepalive);
        println!(
            "  max_request_body_bytes = {}",
            self.http.max_request_body_bytes
        );

        println!("\n[cache]");
        println!("  enabled              = {}", self.cache.enabled);
        println!("  backend              = {:?}", self.cache.backend);
        println!("  max_entries          = {}", self.cache.max_entries);
        println!("  sweep_interval_secs  = {}", self.cache.sweep_interval_secs);
        println!("  sweep_grace_secs     = {}", self.cache.sweep_grace_secs);
        println!("  admin_path           = {:?}", self.cache.admin_path);
        println!("==============================================");
    }
}
