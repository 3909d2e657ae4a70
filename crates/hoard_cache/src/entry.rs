use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, header};

use crate::{
    key::{VariantKey, VaryHeaders},
    media::MediaType,
    policy::rewrite_max_age,
};

/// Headers never captured into an entry.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Role a stored header value plays when the response is replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderKind {
    CacheControl,
    Cookie,
    EntityTag,
    NewCookie,
    Other,
}

impl HeaderKind {
    pub fn classify(name: &HeaderName) -> Self {
        if *name == header::CACHE_CONTROL {
            HeaderKind::CacheControl
        } else if *name == header::COOKIE {
            HeaderKind::Cookie
        } else if *name == header::ETAG {
            HeaderKind::EntityTag
        } else if *name == header::SET_COOKIE {
            HeaderKind::NewCookie
        } else {
            HeaderKind::Other
        }
    }

    /// Whether a 304 carries this header.
    fn is_validator(self, name: &str) -> bool {
        match self {
            HeaderKind::CacheControl | HeaderKind::EntityTag => true,
            HeaderKind::Cookie | HeaderKind::NewCookie => false,
            HeaderKind::Other => name == header::VARY.as_str(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedHeader {
    pub kind: HeaderKind,
    pub value: String,
}

impl CachedHeader {
    /// Value to emit when serving with `remaining_secs` of freshness left.
    fn replay(&self, remaining_secs: u64) -> String {
        match self.kind {
            HeaderKind::CacheControl => rewrite_max_age(&self.value, remaining_secs),
            HeaderKind::Cookie
            | HeaderKind::EntityTag
            | HeaderKind::NewCookie
            | HeaderKind::Other => self.value.clone(),
        }
    }
}

/// Response headers of an entry, sorted by lowercase name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedHeaders {
    inner: BTreeMap<String, Vec<CachedHeader>>,
}

impl CachedHeaders {
    pub fn capture(headers: &HeaderMap) -> Self {
        let mut inner: BTreeMap<String, Vec<CachedHeader>> = BTreeMap::new();
        for (name, value) in headers {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            let Ok(value) = value.to_str() else {
                continue;
            };
            inner
                .entry(name.as_str().to_string())
                .or_default()
                .push(CachedHeader {
                    kind: HeaderKind::classify(name),
                    value: value.to_string(),
                });
        }
        Self { inner }
    }

    pub fn get(&self, name: &str) -> Option<&[CachedHeader]> {
        self.inner.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CachedHeader])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Every stored header, as sent on a 200 served from cache.
    pub fn render(&self, remaining_secs: u64) -> HeaderMap {
        self.render_filtered(remaining_secs, |_, _| true)
    }

    /// Only validators and cache headers, as sent on a 304.
    pub fn render_validators(&self, remaining_secs: u64) -> HeaderMap {
        self.render_filtered(remaining_secs, |name, kind| kind.is_validator(name))
    }

    fn render_filtered<F>(&self, remaining_secs: u64, keep: F) -> HeaderMap
    where
        F: Fn(&str, HeaderKind) -> bool,
    {
        let mut out = HeaderMap::new();
        for (name, values) in &self.inner {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for stored in values {
                if !keep(name, stored.kind) {
                    continue;
                }
                if let Ok(value) = HeaderValue::from_str(&stored.replay(remaining_secs)) {
                    out.append(header_name.clone(), value);
                }
            }
        }
        out
    }
}

/// Everything needed to build a [`CacheEntry`].
pub(crate) struct EntryParts {
    pub uri: String,
    pub media_type: MediaType,
    pub headers: CachedHeaders,
    pub body: Bytes,
    pub etag: String,
    pub max_age_secs: u64,
    pub created_at_secs: u64,
    pub vary: VaryHeaders,
    pub sequence: u64,
}

/// One cached representation of one URI. Never mutated once built; `add`
/// replaces it wholesale.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    uri: String,
    media_type: MediaType,
    headers: CachedHeaders,
    body: Bytes,
    etag: String,
    max_age_secs: u64,
    expires_at_secs: u64,
    vary: VaryHeaders,
    sequence: u64,
}

impl CacheEntry {
    pub(crate) fn from_parts(parts: EntryParts) -> Self {
        Self {
            expires_at_secs: parts.created_at_secs.saturating_add(parts.max_age_secs),
            uri: parts.uri,
            media_type: parts.media_type,
            headers: parts.headers,
            body: parts.body,
            etag: parts.etag,
            max_age_secs: parts.max_age_secs,
            vary: parts.vary,
            sequence: parts.sequence,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn headers(&self) -> &CachedHeaders {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    pub fn expires_at_secs(&self) -> u64 {
        self.expires_at_secs
    }

    pub fn vary(&self) -> &VaryHeaders {
        &self.vary
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn key(&self) -> VariantKey {
        VariantKey::new(&self.media_type, &self.vary)
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at_secs
    }

    pub fn remaining_secs(&self, now_secs: u64) -> u64 {
        self.expires_at_secs.saturating_sub(now_secs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(uri: &str, media: &str, etag: &str, created: u64, max_age: u64) -> CacheEntry {
        entry_with(uri, media, etag, created, max_age, VaryHeaders::new(), 0)
    }

    pub(crate) fn entry_with(
        uri: &str,
        media: &str,
        etag: &str,
        created: u64,
        max_age: u64,
        vary: VaryHeaders,
        sequence: u64,
    ) -> CacheEntry {
        CacheEntry::from_parts(EntryParts {
            uri: uri.to_string(),
            media_type: media.parse().expect("media type"),
            headers: CachedHeaders::default(),
            body: Bytes::from_static(b"body"),
            etag: etag.to_string(),
            max_age_secs: max_age,
            created_at_secs: created,
            vary,
            sequence,
        })
    }

    #[test]
    fn expiry_is_inclusive() {
        let e = entry("/a", "text/plain", "x", 100, 2);
        assert!(!e.is_expired(101));
        assert!(e.is_expired(102));
        assert_eq!(e.remaining_secs(101), 1);
        assert_eq!(e.remaining_secs(500), 0);
    }

    #[test]
    fn zero_max_age_is_expired_immediately() {
        let e = entry("/a", "text/plain", "x", 100, 0);
        assert!(e.is_expired(100));
    }

    #[test]
    fn capture_tags_header_roles() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, "public, max-age=60".parse().unwrap());
        headers.insert(header::ETAG, "\"abc\"".parse().unwrap());
        headers.append(header::SET_COOKIE, "a=1".parse().unwrap());
        headers.append(header::SET_COOKIE, "b=2".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "5".parse().unwrap());

        let captured = CachedHeaders::capture(&headers);
        assert_eq!(captured.get("cache-control").unwrap()[0].kind, HeaderKind::CacheControl);
        assert_eq!(captured.get("etag").unwrap()[0].kind, HeaderKind::EntityTag);
        assert_eq!(captured.get("set-cookie").unwrap().len(), 2);
        assert_eq!(captured.get("set-cookie").unwrap()[1].kind, HeaderKind::NewCookie);
        assert_eq!(captured.get("content-type").unwrap()[0].kind, HeaderKind::Other);
        assert!(captured.get("content-length").is_none());
    }

    #[test]
    fn render_rewrites_max_age_and_keeps_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, "public, max-age=60".parse().unwrap());
        headers.append(header::SET_COOKIE, "a=1".parse().unwrap());
        headers.append(header::SET_COOKIE, "b=2".parse().unwrap());

        let rendered = CachedHeaders::capture(&headers).render(12);
        assert_eq!(rendered[header::CACHE_CONTROL], "public, max-age=12");
        assert_eq!(rendered.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn validators_only_for_not_modified() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, "max-age=60".parse().unwrap());
        headers.insert(header::ETAG, "\"abc\"".parse().unwrap());
        headers.insert(header::VARY, "X-Test-Vary".parse().unwrap());
        headers.insert(header::SET_COOKIE, "a=1".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        let rendered = CachedHeaders::capture(&headers).render_validators(30);
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[header::CACHE_CONTROL], "max-age=30");
        assert_eq!(rendered[header::ETAG], "\"abc\"");
        assert!(rendered.get(header::SET_COOKIE).is_none());
    }
}
