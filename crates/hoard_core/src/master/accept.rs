use std::{io, sync::Arc, time::Duration};

use anyhow::Context;
use hoard_cache::Handler;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::worker::{WorkerContext, serve_connection};

/// Pause after an accept error that is not tied to a single client
/// (typically fd exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    info!(
        target: "hoard::master",
        listen = %listen_addr,
        "Listener bound"
    );
    Ok(listener)
}

/// Errors that concern one client only; the next accept may succeed at once.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Accept connections forever, one task per connection.
///
/// A permit is taken before accepting, so at most `worker_connections`
/// sockets are open at once and extra clients wait in the kernel backlog.
#[instrument(skip(listener, semaphore, ctx), fields(listen = %listen_addr))]
pub(crate) async fn accept_loop<H: Handler + 'static>(
    listener: TcpListener,
    listen_addr: String,
    semaphore: Arc<Semaphore>,
    ctx: Arc<WorkerContext<H>>,
) -> anyhow::Result<()> {
    info!(target: "hoard::master", "Accepting connections");

    loop {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("connection semaphore closed")?;

        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) if is_connection_error(&e) => {
                debug!(target: "hoard::master", error = ?e, "Client gone before accept");
                continue;
            }
            Err(e) => {
                warn!(target: "hoard::master", error = ?e, "Accept failed, backing off");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        debug!(
            target: "hoard::master",
            client_addr = %addr,
            available_permits = semaphore.available_permits(),
            "Connection accepted"
        );

        let ctx = ctx.clone();
        let span = tracing::info_span!("connection", client_addr = %addr);
        tokio::spawn(
            async move {
                if let Err(e) = serve_connection(stream, addr, ctx).await {
                    debug!(target: "hoard::worker", error = ?e, "Connection closed with error");
                }
                drop(permit);
            }
            .instrument(span),
        );
    }
}
