//! Request interception: lookup, negotiate, validate, then serve from cache
//! or delegate to the handler and store what it returns.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, header};

use crate::{
    conditional::{Conditions, Outcome, evaluate, not_modified_after_recompute},
    entry::CacheEntry,
    etag::EntityTag,
    key::{header_values, snapshot_vary},
    manager::{CacheManager, NewEntry},
    media::{Accept, MediaType},
    policy::{CacheDirectives, CachePolicy},
};

/// Whatever computes responses behind the cache.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn call(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        (**self).call(request).await
    }
}

pub struct CachePipeline<H> {
    cache: Arc<CacheManager>,
    handler: H,
    enabled: bool,
}

impl<H: Handler> CachePipeline<H> {
    pub fn new(cache: Arc<CacheManager>, handler: H) -> Self {
        Self {
            cache,
            handler,
            enabled: true,
        }
    }

    /// A disabled pipeline hands every request straight to the handler.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub async fn handle(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        if !self.enabled {
            return self.handler.call(request).await;
        }

        let method = request.method().clone();
        let uri = cache_uri(request.uri());

        if CachePolicy::invalidates(&method) {
            return self.invalidate_after(request, &uri).await;
        }
        if !CachePolicy::is_cacheable(&method) {
            return self.handler.call(request).await;
        }

        let accept = Accept::from_headers(request.headers());
        let conditions = Conditions::from_headers(request.headers());

        let entry = match self.cache.get(&uri, &accept, request.headers()).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(target: "hoard::pipeline", uri = %uri, error = ?e, "cache lookup failed, treating as miss");
                None
            }
        };

        let now = self.cache.now();
        let outcome = evaluate(entry, &conditions, now);
        tracing::debug!(target: "hoard::pipeline", method = %method, uri = %uri, outcome = outcome.label(), "evaluated");

        let reason = match outcome {
            Outcome::NotModified(entry) => return Ok(not_modified(&entry, now)),
            Outcome::Cached(entry) => return Ok(from_cache(&entry, now, method == Method::HEAD)),
            Outcome::Delegate(reason) => reason,
        };

        let request_headers = request.headers().clone();
        let response = self.handler.call(request).await?;

        if !CachePolicy::is_storable(&method) {
            return Ok(response);
        }
        let Some(new) = storable(&uri, &request_headers, &response) else {
            return Ok(response);
        };

        match self.cache.add(new).await {
            Ok(entry) => {
                if not_modified_after_recompute(&reason, entry.etag(), &conditions) {
                    tracing::debug!(target: "hoard::pipeline", uri = %uri, etag = %entry.etag(), "unchanged after recompute");
                    return Ok(not_modified(&entry, self.cache.now()));
                }
            }
            Err(e) => {
                tracing::warn!(target: "hoard::pipeline", uri = %uri, error = ?e, "failed to store response");
            }
        }
        Ok(response)
    }

    async fn invalidate_after(
        &self,
        request: Request<Bytes>,
        uri: &str,
    ) -> anyhow::Result<Response<Bytes>> {
        let response = self.handler.call(request).await?;
        if response.status().is_success() {
            if let Err(e) = self.cache.remove(uri).await {
                tracing::warn!(target: "hoard::pipeline", uri = %uri, error = ?e, "invalidation failed");
            }
        }
        Ok(response)
    }
}

/// Path plus query: the key every variant of a resource is stored under.
pub fn cache_uri(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Header names listed by a response `Vary`. `None` when it says `*`.
fn vary_names(headers: &HeaderMap) -> Option<Vec<HeaderName>> {
    let mut names = Vec::new();
    for value in header_values(headers, &header::VARY) {
        if value == "*" {
            return None;
        }
        if let Ok(name) = HeaderName::from_bytes(value.to_ascii_lowercase().as_bytes()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Some(names)
}

/// Build the entry for a handler response, or `None` when it must not be
/// stored.
fn storable(uri: &str, request_headers: &HeaderMap, response: &Response<Bytes>) -> Option<NewEntry> {
    let skip = |why: &str| {
        tracing::debug!(target: "hoard::pipeline", uri = %uri, reason = why, "response not stored");
    };

    if response.status() != StatusCode::OK {
        skip("status");
        return None;
    }
    let headers = response.headers();
    let Some(directives) = CacheDirectives::from_headers(headers) else {
        skip("no cache-control");
        return None;
    };
    let Some(ttl) = directives.storable_ttl() else {
        skip("cache-control forbids storing");
        return None;
    };
    let Some(etag) = EntityTag::from_headers(headers) else {
        skip("no etag");
        return None;
    };
    let Some(names) = vary_names(headers) else {
        skip("vary *");
        return None;
    };

    Some(NewEntry {
        uri: uri.to_string(),
        media_type: MediaType::from_content_type(headers),
        directives: CacheDirectives::max_age(ttl),
        headers: headers.clone(),
        body: response.body().clone(),
        etag: etag.value,
        vary: snapshot_vary(request_headers, &names),
    })
}

fn not_modified(entry: &CacheEntry, now_secs: u64) -> Response<Bytes> {
    let mut headers = entry.headers().render_validators(entry.remaining_secs(now_secs));
    ensure_etag(&mut headers, entry);

    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    *response.headers_mut() = headers;
    response
}

fn from_cache(entry: &CacheEntry, now_secs: u64, head: bool) -> Response<Bytes> {
    let mut headers = entry.headers().render(entry.remaining_secs(now_secs));
    ensure_etag(&mut headers, entry);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(entry.body().len()));

    let body = if head { Bytes::new() } else { entry.body().clone() };
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    response
}

fn ensure_etag(headers: &mut HeaderMap, entry: &CacheEntry) {
    if headers.contains_key(header::ETAG) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&EntityTag::strong(entry.etag()).header) {
        headers.insert(header::ETAG, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_uri_keeps_query() {
        let uri: Uri = "http://example.com/cache/stuff?page=2".parse().unwrap();
        assert_eq!(cache_uri(&uri), "/cache/stuff?page=2");
        let uri: Uri = "/plain".parse().unwrap();
        assert_eq!(cache_uri(&uri), "/plain");
    }

    #[test]
    fn vary_star_is_not_storable() {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, "Accept, *".parse().unwrap());
        assert!(vary_names(&headers).is_none());

        headers.insert(header::VARY, "X-Test-Vary, accept".parse().unwrap());
        let names = vary_names(&headers).unwrap();
        assert_eq!(names, vec![HeaderName::from_static("x-test-vary"), header::ACCEPT]);
    }

    fn response(status: StatusCode, pairs: &[(HeaderName, &str)]) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from_static(b"payload"));
        *response.status_mut() = status;
        for (name, value) in pairs {
            response.headers_mut().append(name.clone(), value.parse().unwrap());
        }
        response
    }

    #[test]
    fn storability_rules() {
        let ok = [
            (header::CACHE_CONTROL, "max-age=5"),
            (header::ETAG, "\"v1\""),
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        ];
        let new = storable("/a", &HeaderMap::new(), &response(StatusCode::OK, &ok)).expect("storable");
        assert_eq!(new.etag, "v1");
        assert_eq!(new.media_type, MediaType::new("text", "plain"));
        assert_eq!(new.directives.max_age_secs, Some(5));

        assert!(storable("/a", &HeaderMap::new(), &response(StatusCode::CREATED, &ok)).is_none());

        let no_etag = [(header::CACHE_CONTROL, "max-age=5")];
        assert!(storable("/a", &HeaderMap::new(), &response(StatusCode::OK, &no_etag)).is_none());

        let no_cc = [(header::ETAG, "\"v1\"")];
        assert!(storable("/a", &HeaderMap::new(), &response(StatusCode::OK, &no_cc)).is_none());

        let no_store = [(header::CACHE_CONTROL, "no-store, max-age=5"), (header::ETAG, "\"v1\"")];
        assert!(storable("/a", &HeaderMap::new(), &response(StatusCode::OK, &no_store)).is_none());
    }

    #[test]
    fn missing_content_type_is_octet_stream() {
        let pairs = [(header::CACHE_CONTROL, "max-age=5"), (header::ETAG, "\"v1\"")];
        let new = storable("/a", &HeaderMap::new(), &response(StatusCode::OK, &pairs)).unwrap();
        assert_eq!(new.media_type, MediaType::octet_stream());
    }
}
