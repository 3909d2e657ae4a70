//! Demo resources served behind the cache.
//!
//! - `GET /cache` counts invocations
//! - `PUT /cache` invalidates it
//! - `GET /cache/accepts` negotiates `text/plain` or `text/html`
//! - `GET /cache/stuff` always returns the same body
//! - `GET /cache/vary` echoes `X-Test-Vary` and declares `Vary` on it

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use hoard_cache::{Accept, EntityTag, Handler, MediaType};
use http::{Method, Request, Response, StatusCode, header, response::Builder};
use tracing::debug;

const MAX_AGE_SECS: u64 = 2;

#[derive(Debug, Default)]
pub struct DemoResources {
    count: AtomicUsize,
    plain_count: AtomicUsize,
    html_count: AtomicUsize,
}

fn next(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// A 200 that the cache will store: content type, max-age and a body etag.
fn cacheable(content_type: &str, body: &[u8]) -> Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, format!("max-age={MAX_AGE_SECS}"))
        .header(header::ETAG, EntityTag::from_body(body).header)
}

fn status(code: StatusCode) -> anyhow::Result<Response<Bytes>> {
    Ok(Response::builder().status(code).body(Bytes::new())?)
}

impl DemoResources {
    fn counter(&self) -> anyhow::Result<Response<Bytes>> {
        let body = format!("hello world{}", next(&self.count));
        Ok(cacheable("text/plain", body.as_bytes()).body(Bytes::from(body))?)
    }

    fn accepts(&self, request: &Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        let offered = [MediaType::new("text", "plain"), MediaType::new("text", "html")];
        let accept = Accept::from_headers(request.headers());
        let Some(chosen) = accept.negotiate(&offered) else {
            return status(StatusCode::NOT_ACCEPTABLE);
        };

        let (body, content_type) = if chosen.subtype() == "html" {
            (format!("html{}", next(&self.html_count)), "text/html")
        } else {
            (format!("plain{}", next(&self.plain_count)), "text/plain")
        };
        Ok(cacheable(content_type, body.as_bytes()).body(Bytes::from(body))?)
    }

    fn stuff(&self) -> anyhow::Result<Response<Bytes>> {
        next(&self.count);
        Ok(cacheable("text/plain", b"stuff").body(Bytes::from_static(b"stuff"))?)
    }

    fn vary(&self, request: &Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        let n = next(&self.count);
        let value = request
            .headers()
            .get("x-test-vary")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("default")
            .to_string();
        Ok(cacheable("text/plain", value.as_bytes())
            .header(header::VARY, "X-Test-Vary")
            .header("x-count", n.to_string())
            .body(Bytes::from(value))?)
    }
}

#[async_trait]
impl Handler for DemoResources {
    async fn call(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        debug!(
            target: "hoard::resources",
            method = %request.method(),
            path = %request.uri().path(),
            "Computing response"
        );

        match (request.method(), request.uri().path()) {
            (&Method::GET | &Method::HEAD, "/cache") => self.counter(),
            (&Method::PUT, "/cache") => status(StatusCode::NO_CONTENT),
            (&Method::GET | &Method::HEAD, "/cache/accepts") => self.accepts(&request),
            (&Method::GET | &Method::HEAD, "/cache/stuff") => self.stuff(),
            (&Method::GET | &Method::HEAD, "/cache/vary") => self.vary(&request),
            (_, "/cache" | "/cache/accepts" | "/cache/stuff" | "/cache/vary") => {
                status(StatusCode::METHOD_NOT_ALLOWED)
            }
            _ => status(StatusCode::NOT_FOUND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::get(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn accepts_follows_quality() {
        let demo = DemoResources::default();
        let html = demo
            .call(get("/cache/accepts", &[("accept", "text/plain;q=0.5, text/html")]))
            .await
            .unwrap();
        assert_eq!(html.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(html.body().as_ref(), b"html1");

        let refused = demo
            .call(get("/cache/accepts", &[("accept", "image/png")]))
            .await
            .unwrap();
        assert_eq!(refused.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn vary_declares_header() {
        let demo = DemoResources::default();
        let response = demo
            .call(get("/cache/vary", &[("x-test-vary", "foo")]))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::VARY], "X-Test-Vary");
        assert_eq!(response.headers()["x-count"], "1");
        assert_eq!(response.body().as_ref(), b"foo");
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let demo = DemoResources::default();
        let response = demo.call(get("/nope", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
