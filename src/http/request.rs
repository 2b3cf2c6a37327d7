//! Inbound request extraction.
//!
//! # Responsibilities
//! - Pull `apiKey` and `url` out of the query string
//! - Read the inbound body under the configured size cap, once authorized
//!
//! # Design Decisions
//! - A parameter given more than once counts as missing
//! - Declared oversize bodies are refused before any byte is read

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Uri};
use url::form_urlencoded;

use crate::proxy::relay::{buffer_body, BufferError};
use crate::proxy::ProxyError;

pub const API_KEY_PARAM: &str = "apiKey";
pub const TARGET_URL_PARAM: &str = "url";

/// The proxy's query parameters, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyQuery {
    pub presented_key: Option<String>,
    pub target_url: Option<String>,
}

impl ProxyQuery {
    pub fn from_uri(uri: &Uri) -> Self {
        let query = uri.query();
        Self {
            presented_key: single_param(query, API_KEY_PARAM),
            target_url: single_param(query, TARGET_URL_PARAM),
        }
    }
}

/// Value of a query parameter that appears exactly once and is non-empty.
pub fn single_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    let mut values = form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned());

    let first = values.next()?;
    if values.next().is_some() || first.is_empty() {
        return None;
    }
    Some(first)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Read the inbound body, refusing anything over `max_body_bytes`.
pub async fn read_body(
    headers: &HeaderMap,
    body: Body,
    max_body_bytes: usize,
) -> Result<Bytes, ProxyError> {
    buffer_body(declared_length(headers), body.into_data_stream(), max_body_bytes)
        .await
        .map_err(|e| match e {
            BufferError::TooLarge { limit } => ProxyError::PayloadTooLarge { limit },
            BufferError::Stream(e) => {
                ProxyError::BadRequest(format!("failed to read request body: {}", e))
            }
        })
}
