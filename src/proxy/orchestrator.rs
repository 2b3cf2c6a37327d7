//! Per-request orchestration.
//!
//! # State Transitions
//! ```text
//! Received → Validating → Sanitizing → Dispatching → Relaying → Completed
//!     │           │                         │
//!     └───────────┴─────────────────────────┴──→ Failed(ProxyError)
//! ```
//!
//! Exactly one upstream attempt is made per inbound request. `authorize`
//! covers the first two stages and `forward` the rest, so the HTTP layer can
//! leave the inbound body unread until the key has been accepted.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use crate::config::ProxyConfig;
use crate::keys::{KeyRecord, KeyStore, KeyValidator, Validation};
use crate::observability::logging::redact_key;
use crate::proxy::dispatcher::{parse_target, OutboundRequest, Upstream};
use crate::proxy::error::ProxyError;
use crate::proxy::relay::{relay, ProxyResponse};
use crate::proxy::sanitizer::RequestSanitizer;

/// One inbound proxy call.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub presented_key: Option<String>,
    pub target_url: Option<String>,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Proof that a request passed key validation.
#[derive(Debug, Clone)]
pub struct Authorized {
    record: KeyRecord,
    target: String,
}

impl Authorized {
    pub fn record(&self) -> &KeyRecord {
        &self.record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Validating,
    Sanitizing,
    Dispatching,
    Relaying,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validating => "validating",
            Stage::Sanitizing => "sanitizing",
            Stage::Dispatching => "dispatching",
            Stage::Relaying => "relaying",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Composes validation, sanitization, dispatch, and relay.
#[derive(Clone)]
pub struct ProxyService {
    validator: KeyValidator,
    sanitizer: Arc<RequestSanitizer>,
    upstream: Arc<dyn Upstream>,
}

impl ProxyService {
    pub fn new(
        validator: KeyValidator,
        sanitizer: RequestSanitizer,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            validator,
            sanitizer: Arc::new(sanitizer),
            upstream,
        }
    }

    /// Wire the service from configuration around an already opened store.
    pub fn from_config(
        config: &ProxyConfig,
        store: Arc<dyn KeyStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let validator = KeyValidator::new(store, config.keys.lookup_timeout())
            .with_expiry_enforcement(config.keys.enforce_expiry);
        let sanitizer = RequestSanitizer::new(&config.sanitizer.extra_denied_headers);
        Self::new(validator, sanitizer, upstream)
    }

    /// Run a fully extracted request through every stage.
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let ProxyRequest {
            presented_key,
            target_url,
            method,
            headers,
            body,
        } = request;

        let authorized = self.authorize(presented_key, target_url).await?;
        self.forward(authorized, method, headers, body).await
    }

    /// Check the query parameters and the presented key.
    ///
    /// Needs nothing from the request body, so callers can defer reading it
    /// until this succeeds.
    pub async fn authorize(
        &self,
        presented_key: Option<String>,
        target_url: Option<String>,
    ) -> Result<Authorized, ProxyError> {
        enter(Stage::Received);
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        let (Some(key), Some(target)) = (present(presented_key), present(target_url)) else {
            return Err(ProxyError::missing_parameters());
        };

        enter(Stage::Validating);
        match self.validator.validate(Some(&key)).await {
            Validation::Authorized(record) => Ok(Authorized { record, target }),
            Validation::Rejected(reason) => {
                tracing::info!(key = %redact_key(&key), reason = reason.as_str(), "Key rejected");
                Err(ProxyError::Forbidden)
            }
        }
    }

    /// Sanitize, dispatch, and relay an authorized request.
    pub async fn forward(
        &self,
        authorized: Authorized,
        method: Method,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<ProxyResponse, ProxyError> {
        let Authorized { record, target } = authorized;

        enter(Stage::Sanitizing);
        let headers = self.sanitizer.sanitize(headers);

        enter(Stage::Dispatching);
        let target = parse_target(&target)?;
        let outbound = OutboundRequest::new(target, method, headers, body);
        let upstream = self.upstream.dispatch(outbound).await.map_err(|e| {
            tracing::warn!(key_id = %record.id, error = %e, "Upstream dispatch failed");
            ProxyError::from(e)
        })?;

        enter(Stage::Relaying);
        let response = relay(upstream);

        enter(Stage::Completed);
        Ok(response)
    }
}

fn enter(stage: Stage) {
    tracing::debug!(stage = %stage, "Proxy stage");
}
