use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName};

use crate::media::MediaType;

/// Request header values recorded when a variant was stored, keyed by
/// lowercase header name.
pub type VaryHeaders = BTreeMap<String, Vec<String>>;

/// Identity of one stored variant under a URI.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Clone)]
pub struct VariantKey {
    pub media_type: MediaType,
    pub vary: Vec<(String, Vec<String>)>,
}

impl VariantKey {
    pub fn new(media_type: &MediaType, vary: &VaryHeaders) -> Self {
        Self {
            media_type: media_type.clone(),
            vary: vary.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// All values a request carries for `name`: every field line split on commas.
pub fn header_values(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Snapshot the request values of the headers named by a response `Vary`.
/// A header the request did not send is recorded with no values.
pub fn snapshot_vary(request_headers: &HeaderMap, vary_names: &[HeaderName]) -> VaryHeaders {
    vary_names
        .iter()
        .map(|name| (name.as_str().to_string(), header_values(request_headers, name)))
        .collect()
}
