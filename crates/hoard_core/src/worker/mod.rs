//! Per-connection HTTP/1 handling.
//!
//! Each request body is collected, then routed either to the admin clear
//! endpoint or through the cache pipeline.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use hoard_cache::{CachePipeline, Handler};
use hoard_config::HoardConfig;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

mod dispatch;
mod request;

pub use dispatch::respond;

/// Everything a connection task needs, shared across connections.
pub struct WorkerContext<H> {
    pipeline: CachePipeline<H>,
    admin_path: Option<String>,
    max_body_bytes: usize,
    keepalive: bool,
}

impl<H: Handler> WorkerContext<H> {
    pub fn new(pipeline: CachePipeline<H>, cfg: &HoardConfig) -> Self {
        Self {
            pipeline,
            admin_path: cfg.cache.admin_path().map(str::to_string),
            max_body_bytes: usize::try_from(cfg.http.max_request_body_bytes).unwrap_or(usize::MAX),
            keepalive: cfg.http.keepalive,
        }
    }

    pub fn pipeline(&self) -> &CachePipeline<H> {
        &self.pipeline
    }
}

#[instrument(skip(stream, ctx), fields(client = %client_addr))]
pub async fn serve_connection<H: Handler + 'static>(
    stream: TcpStream,
    client_addr: SocketAddr,
    ctx: Arc<WorkerContext<H>>,
) -> anyhow::Result<()> {
    debug!(target: "hoard::worker", "Handling new client connection");

    let keepalive = ctx.keepalive;
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let ctx = ctx.clone();
        async move { Ok::<_, Infallible>(respond(&ctx, req).await) }
    });

    http1::Builder::new()
        .keep_alive(keepalive)
        .serve_connection(io, service)
        .await
        .context("HTTP/1 connection error")?;

    Ok(())
}
