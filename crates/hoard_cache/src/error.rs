use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("store failure on {op} {uri}: {source}")]
    Store {
        op: &'static str,
        uri: String,
        #[source]
        source: StoreError,
    },
}

impl CacheError {
    pub(crate) fn store(op: &'static str, uri: &str, source: StoreError) -> Self {
        CacheError::Store {
            op,
            uri: uri.to_string(),
            source,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Store { source, .. } => source.is_retryable(),
        }
    }
}
