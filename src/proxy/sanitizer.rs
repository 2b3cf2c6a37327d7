//! Inbound header sanitization.
//!
//! Strips every header that belongs to the caller → proxy hop or that
//! identifies the hosting infrastructure, so none of it reaches the target.
//! Header names are case-insensitive; `HeaderName` stores them lowercased.

use std::collections::HashSet;

use axum::http::header::{self, HeaderMap, HeaderName};

/// Virtual host and platform-injected routing/identity headers.
const INFRASTRUCTURE_HEADERS: &[&str] = &[
    "host",
    "x-vercel-deployment-url",
    "x-vercel-id",
    "x-real-ip",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-forwarded-port",
    "forwarded",
    "via",
    "x-request-id",
    "x-amzn-trace-id",
    "cf-connecting-ip",
    "cf-ray",
    "true-client-ip",
    "x-client-ip",
];

/// Connection-scoped headers (RFC 9110 §7.6.1) plus framing and encoding
/// negotiated per hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "accept-encoding",
];

/// Removes hop-local and infrastructure-identifying headers.
#[derive(Debug, Clone)]
pub struct RequestSanitizer {
    denied: HashSet<HeaderName>,
}

impl RequestSanitizer {
    /// Sanitizer with the built-in denylist plus `extra` header names.
    ///
    /// Invalid names in `extra` are skipped; config validation reports them.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denied = INFRASTRUCTURE_HEADERS
            .iter()
            .chain(HOP_BY_HOP_HEADERS)
            .map(|name| HeaderName::from_static(name))
            .chain(
                extra
                    .into_iter()
                    .filter_map(|name| HeaderName::from_bytes(name.as_ref().as_bytes()).ok()),
            )
            .collect();
        Self { denied }
    }

    pub fn sanitize(&self, mut headers: HeaderMap) -> HeaderMap {
        // Headers the caller nominated as connection-scoped.
        let nominated: Vec<HeaderName> = headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
            .collect();

        for name in nominated.iter().chain(self.denied.iter()) {
            headers.remove(name);
        }
        headers
    }

    /// Whether `name` would be stripped.
    pub fn denies(&self, name: &HeaderName) -> bool {
        self.denied.contains(name)
    }
}

impl Default for RequestSanitizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}
