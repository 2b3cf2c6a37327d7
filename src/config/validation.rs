//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and
//! cross-field constraints. Every violation is reported, not just the first.

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{ProxyConfig, ADMIN_KEY_PLACEHOLDER};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.request_timeout_secs", "must be > 0"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be > 0"));
    }
    if config.upstream.max_response_bytes == 0 {
        errors.push(ValidationError::new("upstream.max_response_bytes", "must be > 0"));
    }
    if config.timeouts.inbound_secs <= config.upstream.request_timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.inbound_secs",
            "must exceed upstream.request_timeout_secs so upstream failures surface as 502",
        ));
    }

    if config.security.max_body_bytes == 0 {
        errors.push(ValidationError::new("security.max_body_bytes", "must be > 0"));
    }

    if config.keys.lookup_timeout_ms == 0 {
        errors.push(ValidationError::new("keys.lookup_timeout_ms", "must be > 0"));
    }

    for name in &config.sanitizer.extra_denied_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "sanitizer.extra_denied_headers",
                format!("'{}' is not a valid header name", name),
            ));
        }
    }

    if config.admin.enabled {
        let key = config.admin.api_key.trim();
        if key.is_empty() || key == ADMIN_KEY_PLACEHOLDER {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set to a non-placeholder value when admin is enabled",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.max_response_bytes = 0;
        config.sanitizer.extra_denied_headers = vec!["bad header".into()];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.max_response_bytes",
                "sanitizer.extra_denied_headers",
            ]
        );
    }

    #[test]
    fn admin_requires_real_token() {
        let mut config = ProxyConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");

        config.admin.api_key = "s3cret-operator-token".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn inbound_timeout_must_cover_upstream() {
        let mut config = ProxyConfig::default();
        config.timeouts.inbound_secs = config.upstream.request_timeout_secs;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "timeouts.inbound_secs");
    }
}
