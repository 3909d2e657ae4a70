use bytes::Bytes;
use hoard_cache::Handler;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Body;
use tracing::{debug, error, info, warn};

use super::WorkerContext;
use super::request::collect_request;

/// Answer one request: admin clear endpoint, else the cache pipeline.
/// Never fails; errors become 4xx/5xx responses.
pub async fn respond<H, B>(ctx: &WorkerContext<H>, req: Request<B>) -> Response<Full<Bytes>>
where
    H: Handler,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let uri = req.uri().clone();

    let req = match collect_request(req, ctx.max_body_bytes).await {
        Ok(req) => req,
        Err(e) => {
            warn!(
                target: "hoard::worker",
                %method,
                %uri,
                error = %e,
                "Rejecting request body"
            );
            return simple_response(e.status(), e.to_string());
        }
    };

    if is_admin_clear(ctx, &req) {
        return clear_cache(ctx).await;
    }

    let response = match ctx.pipeline.handle(req).await {
        Ok(response) => response.map(Full::new),
        Err(e) => {
            error!(
                target: "hoard::worker",
                %method,
                %uri,
                error = ?e,
                "Handler failed"
            );
            simple_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };

    debug!(
        target: "hoard::worker",
        %method,
        %uri,
        status = response.status().as_u16(),
        "Request served"
    );
    response
}

fn is_admin_clear<H>(ctx: &WorkerContext<H>, req: &Request<Bytes>) -> bool {
    req.method() == Method::POST
        && ctx
            .admin_path
            .as_deref()
            .is_some_and(|path| path == req.uri().path())
}

async fn clear_cache<H: Handler>(ctx: &WorkerContext<H>) -> Response<Full<Bytes>> {
    match ctx.pipeline.cache().clear().await {
        Ok(()) => {
            info!(target: "hoard::worker", "Cache cleared via admin endpoint");
            simple_response(StatusCode::NO_CONTENT, "")
        }
        Err(e) => {
            warn!(target: "hoard::worker", error = ?e, "Admin cache clear failed");
            simple_response(StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable")
        }
    }
}

fn simple_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
