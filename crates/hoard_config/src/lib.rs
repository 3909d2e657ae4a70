mod cache;
mod global;
mod hoard;
mod http;
pub mod validation;

pub use cache::{CacheBackendKind, CacheConfig};
pub use global::GlobalConfig;
pub use hoard::HoardConfig;
pub use http::HttpConfig;
pub use validation::ConfigReport;
