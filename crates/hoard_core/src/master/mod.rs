//! Listener setup and the accept loop.

use std::sync::Arc;

use hoard_cache::{CachePipeline, Handler};
use hoard_config::HoardConfig;
use tokio::net::TcpListener;
use tracing::instrument;

use crate::worker::WorkerContext;

mod accept;
mod startup;

use accept::{accept_loop, bind_listener};

pub struct Master<H> {
    cfg: Arc<HoardConfig>,
    ctx: Arc<WorkerContext<H>>,
}

impl<H: Handler + 'static> Master<H> {
    pub fn new(cfg: HoardConfig, pipeline: CachePipeline<H>) -> Self {
        let ctx = Arc::new(WorkerContext::new(pipeline, &cfg));
        Self {
            cfg: Arc::new(cfg),
            ctx,
        }
    }

    /// Bind the configured address and serve until the listener fails.
    #[instrument(skip(self), fields(
        listen = %self.cfg.http.listen,
        worker_connections = %self.cfg.global.worker_connections,
        log_level = %self.cfg.global.log_level,
    ))]
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = bind_listener(&self.cfg.http.listen).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        self.log_startup();
        let semaphore = self.init_semaphore();
        let _sweeper = self.start_sweeper();

        let listen_addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.cfg.http.listen.clone());

        accept_loop(listener, listen_addr, semaphore, self.ctx.clone()).await
    }
}
