//! Key validation.
//!
//! Decides whether a presented key authorizes a proxy request. The outcome
//! distinguishes rejection causes for logging and metrics only; callers see
//! one uniform authorization failure.

use std::sync::Arc;
use std::time::Duration;

use crate::keys::record::{unix_now, KeyRecord};
use crate::keys::store::KeyStore;
use crate::observability::{logging::redact_key, metrics};

/// Why a key was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No key, or an empty one. The store was not consulted.
    MissingKey,
    /// Unknown key, failed lookup, or lookup timeout.
    InvalidKey,
    /// Known key whose lifetime has elapsed (only with expiry enforcement).
    Expired,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingKey => "missing_key",
            Rejection::InvalidKey => "invalid_key",
            Rejection::Expired => "expired",
        }
    }
}

/// Validator outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Authorized(KeyRecord),
    Rejected(Rejection),
}

/// Checks presented keys against a [`KeyStore`].
#[derive(Clone)]
pub struct KeyValidator {
    store: Arc<dyn KeyStore>,
    lookup_timeout: Duration,
    enforce_expiry: bool,
}

impl KeyValidator {
    pub fn new(store: Arc<dyn KeyStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
            enforce_expiry: false,
        }
    }

    /// Reject records whose lifetime has elapsed since issuance.
    pub fn with_expiry_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_expiry = enforce;
        self
    }

    pub async fn validate(&self, presented: Option<&str>) -> Validation {
        let validation = self.decide(presented).await;
        metrics::record_validation(match &validation {
            Validation::Authorized(_) => "authorized",
            Validation::Rejected(reason) => reason.as_str(),
        });
        validation
    }

    async fn decide(&self, presented: Option<&str>) -> Validation {
        let key = match presented {
            Some(k) if !k.is_empty() => k,
            _ => return Validation::Rejected(Rejection::MissingKey),
        };

        let record = match tokio::time::timeout(self.lookup_timeout, self.store.lookup(key)).await {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => {
                tracing::debug!(key = %redact_key(key), "Key not found");
                return Validation::Rejected(Rejection::InvalidKey);
            }
            Ok(Err(e)) => {
                tracing::error!(key = %redact_key(key), error = %e, "Key lookup failed");
                return Validation::Rejected(Rejection::InvalidKey);
            }
            Err(_) => {
                tracing::error!(
                    key = %redact_key(key),
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Key lookup timed out"
                );
                return Validation::Rejected(Rejection::InvalidKey);
            }
        };

        if self.enforce_expiry && record.is_expired_at(unix_now()) {
            tracing::debug!(id = %record.id, "Key expired");
            return Validation::Rejected(Rejection::Expired);
        }

        Validation::Authorized(record)
    }
}
