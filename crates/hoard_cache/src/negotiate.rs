//! Picks one stored variant of a URI for a request.

use std::{cmp::Reverse, sync::Arc};

use http::{HeaderMap, HeaderName};

use crate::{entry::CacheEntry, key::header_values, media::Accept};

/// Choose the variant the client prefers among `candidates`.
///
/// Only variants the client rates at its highest quality are eligible: a
/// lower rated variant is never served while the handler might produce a
/// preferred one. Eligible candidates are ranked by how specific the matching
/// range is, then by how recently they were stored. The first one whose
/// recorded vary headers fit the request wins.
pub fn negotiate(
    candidates: Vec<Arc<CacheEntry>>,
    accept: &Accept,
    request_headers: &HeaderMap,
) -> Option<Arc<CacheEntry>> {
    let top = accept.top_quality();
    let mut ranked: Vec<_> = candidates
        .into_iter()
        .filter_map(|entry| {
            let pref = accept.preference(entry.media_type())?;
            (pref.quality == top).then_some((pref, entry))
        })
        .collect();

    ranked.sort_by_key(|(pref, entry)| Reverse((*pref, entry.sequence())));

    ranked
        .into_iter()
        .map(|(_, entry)| entry)
        .find(|entry| !may_vary(entry, request_headers))
}

/// Whether the request differs from the one that created `entry` on some
/// recorded vary header.
///
/// A header recorded with values must be carried with all of them; extra
/// values are allowed. A header recorded without values (the creating request
/// did not send it) only fits requests that do not send it either.
pub fn may_vary(entry: &CacheEntry, request_headers: &HeaderMap) -> bool {
    entry.vary().iter().any(|(name, stored)| {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return true;
        };
        let current = header_values(request_headers, &name);
        if stored.is_empty() {
            return !current.is_empty();
        }
        !stored.iter().all(|value| current.contains(value))
    })
}
