use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use hoard_cache::{CachePipeline, EntityTag, Handler};
use hoard_config::HoardConfig;
use hoard_core::{Master, build_cache};
use http::{Request, Response, header};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[derive(Default)]
struct Hello {
    calls: AtomicUsize,
}

#[async_trait]
impl Handler for Hello {
    async fn call(&self, _req: Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let body = format!("hello{n}");
        Ok(Response::builder()
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::CACHE_CONTROL, "max-age=60")
            .header(header::ETAG, EntityTag::from_body(body.as_bytes()).header)
            .body(Bytes::from(body))?)
    }
}

async fn roundtrip(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn serves_and_caches_over_tcp() {
    let mut cfg = HoardConfig::default();
    cfg.cache.admin_path = Some("/_cache/clear".into());

    let handler = Arc::new(Hello::default());
    let pipeline = CachePipeline::new(build_cache(&cfg.cache), handler.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(Master::new(cfg, pipeline).serve(listener));

    let get = "GET /greeting HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";

    let first = roundtrip(addr, get).await;
    assert!(first.starts_with("HTTP/1.1 200"), "{first}");
    assert!(first.ends_with("hello1"), "{first}");

    let second = roundtrip(addr, get).await;
    assert!(second.ends_with("hello1"), "{second}");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    let clear = "POST /_cache/clear HTTP/1.1\r\nHost: test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    let cleared = roundtrip(addr, clear).await;
    assert!(cleared.starts_with("HTTP/1.1 204"), "{cleared}");

    let third = roundtrip(addr, get).await;
    assert!(third.ends_with("hello2"), "{third}");

    server.abort();
}
