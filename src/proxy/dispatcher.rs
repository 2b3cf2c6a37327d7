//! Upstream dispatch.
//!
//! One outbound HTTP call per inbound request: no retries, bounded
//! redirects, and a request-level deadline covering headers and body.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use url::Url;

use crate::config::UpstreamConfig;
use crate::proxy::error::DispatchError;
use crate::proxy::relay::{buffer_body, BufferError, UpstreamResponse};

/// A sanitized request ready to leave the proxy.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub target: Url,
    pub method: Method,
    pub headers: HeaderMap,
    /// Always `None` for GET and HEAD.
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(target: Url, method: Method, headers: HeaderMap, body: Bytes) -> Self {
        let body = if method == Method::GET || method == Method::HEAD {
            None
        } else {
            Some(body)
        };
        Self {
            target,
            method,
            headers,
            body,
        }
    }
}

/// Parse a caller-supplied target into an absolute http(s) URL.
pub fn parse_target(raw: &str) -> Result<Url, DispatchError> {
    let url = Url::parse(raw).map_err(|e| DispatchError::InvalidTarget(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DispatchError::InvalidTarget(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(DispatchError::InvalidTarget("missing host".to_string()));
    }
    Ok(url)
}

/// Performs the outbound call.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn dispatch(&self, request: OutboundRequest) -> Result<UpstreamResponse, DispatchError>;
}

/// [`Upstream`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    request_timeout: Duration,
    connect_timeout: Duration,
    max_response_bytes: usize,
}

impl HttpUpstream {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    fn classify(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            self.timeout(e.is_connect())
        } else {
            DispatchError::Unreachable(error_chain(&e))
        }
    }

    /// The deadline that elapsed: connect or whole request.
    fn timeout(&self, during_connect: bool) -> DispatchError {
        if during_connect {
            DispatchError::Timeout(self.connect_timeout)
        } else {
            DispatchError::Timeout(self.request_timeout)
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn dispatch(&self, request: OutboundRequest) -> Result<UpstreamResponse, DispatchError> {
        let OutboundRequest {
            target,
            method,
            headers,
            body,
        } = request;

        tracing::debug!(method = %method, target = %target, "Dispatching upstream request");

        let mut builder = self.client.request(method, target).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let declared_len = response.content_length();

        let body = buffer_body(declared_len, response.bytes_stream(), self.max_response_bytes)
            .await
            .map_err(|e| match e {
                BufferError::TooLarge { limit } => DispatchError::PayloadTooLarge { limit },
                BufferError::Stream(e) => self.classify(e),
            })?;

        tracing::debug!(status = %status, bytes = body.len(), "Upstream responded");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Render an error and its sources as one line.
fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_http_urls() {
        assert!(parse_target("http://example.com/").is_ok());
        assert!(parse_target("https://example.com:8443/a?b=c").is_ok());
    }

    #[test]
    fn rejects_relative_and_foreign_urls() {
        for raw in ["/relative/path", "example.com", "", "ftp://example.com/", "file:///etc/passwd"] {
            assert!(
                matches!(parse_target(raw), Err(DispatchError::InvalidTarget(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn get_and_head_drop_the_body() {
        let url = parse_target("http://example.com/").unwrap();
        let body = Bytes::from_static(b"payload");

        for method in [Method::GET, Method::HEAD] {
            let req = OutboundRequest::new(url.clone(), method, HeaderMap::new(), body.clone());
            assert!(req.body.is_none());
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let req = OutboundRequest::new(url.clone(), method, HeaderMap::new(), body.clone());
            assert_eq!(req.body, Some(body.clone()));
        }
    }

    #[test]
    fn timeouts_report_the_deadline_that_elapsed() {
        let upstream = HttpUpstream::from_config(&UpstreamConfig {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            ..UpstreamConfig::default()
        })
        .unwrap();

        assert_eq!(upstream.timeout(true), DispatchError::Timeout(Duration::from_secs(5)));
        assert_eq!(upstream.timeout(false), DispatchError::Timeout(Duration::from_secs(30)));
        assert_eq!(
            upstream.timeout(true).to_string(),
            "upstream did not respond within 5s"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let upstream = HttpUpstream::from_config(&UpstreamConfig {
            connect_timeout_secs: 2,
            request_timeout_secs: 2,
            ..UpstreamConfig::default()
        })
        .unwrap();

        // Reserve a port, then free it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let req = OutboundRequest::new(
            parse_target(&format!("http://{}/", addr)).unwrap(),
            Method::GET,
            HeaderMap::new(),
            Bytes::new(),
        );
        let err = upstream.dispatch(req).await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {:?}", err);
    }
}
