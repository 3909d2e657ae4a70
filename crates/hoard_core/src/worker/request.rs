use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Body(String),
}

impl RequestError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            RequestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Buffer the whole body, refusing anything larger than `limit`.
pub(crate) async fn collect_request<B>(
    req: Request<B>,
    limit: usize,
) -> Result<Request<Bytes>, RequestError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            RequestError::TooLarge { limit }
        } else {
            RequestError::Body(e.to_string())
        }
    })?;
    Ok(Request::from_parts(parts, collected.to_bytes()))
}
