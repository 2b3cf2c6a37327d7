//! Response relay.
//!
//! The upstream body is buffered in full before it is re-sent as a single
//! payload, so the buffer is capped: a declared `Content-Length` above the
//! cap fails before reading, and a chunked body fails as soon as the running
//! total crosses it. Memory per request is therefore bounded by the cap.

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use thiserror::Error;

/// Headers describing the upstream leg's framing, not the relayed body.
const UPSTREAM_LEG_HEADERS: [HeaderName; 5] = [
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
];

/// Upstream reply with its body already buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the caller receives on success.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Copy status, end-to-end headers, and body from the upstream reply.
pub fn relay(upstream: UpstreamResponse) -> ProxyResponse {
    let UpstreamResponse {
        status,
        mut headers,
        body,
    } = upstream;

    for name in &UPSTREAM_LEG_HEADERS {
        headers.remove(name);
    }

    ProxyResponse {
        status,
        headers,
        body,
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug, Error)]
pub enum BufferError<E> {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Stream(E),
}

/// Collect a body stream into memory, refusing anything over `limit` bytes.
pub async fn buffer_body<S, E>(
    declared_len: Option<u64>,
    stream: S,
    limit: usize,
) -> Result<Bytes, BufferError<E>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error,
{
    let mut stream = std::pin::pin!(stream);

    if let Some(len) = declared_len {
        if len > limit as u64 {
            return Err(BufferError::TooLarge { limit });
        }
    }

    let mut buf: Vec<u8> = Vec::with_capacity(declared_len.map_or(0, |len| len as usize));
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BufferError::Stream)?;
        if buf.len() + chunk.len() > limit {
            return Err(BufferError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
