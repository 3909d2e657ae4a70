use serde::Deserialize;

// =======================================================
// HTTP CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: String,
    pub keepalive: bool,

    // Limits (bytes)
    pub max_request_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            keepalive: true,
            max_request_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    pub fn max_request_body_bytes(&self) -> u64 {
        self.max_request_body_bytes
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &HttpConfig) {
        if self.listen.trim().is_empty() {
            self.listen = defaults.listen.clone();
        }
        if self.max_request_body_bytes == 0 {
            self.max_request_body_bytes = defaults.max_request_body_bytes;
        }
    }
}
