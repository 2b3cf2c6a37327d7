//! Proxy error taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Failure of the upstream leg.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Target is not an absolute http(s) URL. No I/O was attempted.
    #[error("invalid target url: {0}")]
    InvalidTarget(String),

    /// DNS, connect, TLS, or transfer failure.
    #[error("{0}")]
    Unreachable(String),

    /// The request-level deadline elapsed.
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// The upstream body exceeded the relay buffer.
    #[error("upstream response exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl DispatchError {
    /// Network-level failure, timeouts included.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DispatchError::Unreachable(_) | DispatchError::Timeout(_))
    }
}

/// Failure surfaced to the caller. Every variant maps to one status code
/// and one JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// Malformed or missing input. Never touches the store or network.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, unknown, or expired key; all causes share this message.
    #[error("Invalid or incorrect API Key")]
    Forbidden,

    /// The target could not be reached.
    #[error("Bad Gateway: Failed to fetch the target URL")]
    BadGateway { details: String },

    /// A body exceeded its configured bound.
    #[error("Payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
}

pub const MISSING_PARAMETERS: &str = "apiKey and url query parameters are required";

impl ProxyError {
    pub fn missing_parameters() -> Self {
        ProxyError::BadRequest(MISSING_PARAMETERS.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::Forbidden => "forbidden",
            ProxyError::BadGateway { .. } => "bad_gateway",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

impl From<DispatchError> for ProxyError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::InvalidTarget(reason) => ProxyError::BadRequest(format!(
                "url must be an absolute http(s) URL: {}",
                reason
            )),
            DispatchError::Unreachable(_) | DispatchError::Timeout(_) => ProxyError::BadGateway {
                details: e.to_string(),
            },
            DispatchError::PayloadTooLarge { limit } => ProxyError::PayloadTooLarge { limit },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_boundary_kinds() {
        let err: ProxyError = DispatchError::InvalidTarget("relative URL without a base".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ProxyError = DispatchError::Unreachable("dns error".into()).into();
        assert_eq!(err, ProxyError::BadGateway { details: "dns error".into() });

        let err: ProxyError = DispatchError::Timeout(Duration::from_secs(3)).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err: ProxyError = DispatchError::PayloadTooLarge { limit: 8 }.into();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn timeout_is_unreachable() {
        assert!(DispatchError::Timeout(Duration::from_secs(1)).is_unreachable());
        assert!(!DispatchError::InvalidTarget(String::new()).is_unreachable());
    }

    #[test]
    fn forbidden_message_is_fixed() {
        assert_eq!(ProxyError::Forbidden.to_string(), "Invalid or incorrect API Key");
    }
}
