//! Metrics collection and exposition.
//!
//! # Metrics
//! - `keygate_proxy_requests_total` (counter): proxied requests by method, outcome
//! - `keygate_proxy_request_duration_seconds` (histogram): latency by outcome
//! - `keygate_key_validations_total` (counter): validator decisions by result
//! - `keygate_keys_stored` (gauge): records currently held by the key store
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished proxy request.
pub fn record_request(method: &Method, outcome: &'static str, start: Instant) {
    counter!(
        "keygate_proxy_requests_total",
        "method" => method_label(method),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("keygate_proxy_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Label for a request method. Extension methods collapse into `other`.
pub fn method_label(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "HEAD" => "HEAD",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => "other",
    }
}

/// Record a key validation decision.
pub fn record_validation(result: &'static str) {
    counter!("keygate_key_validations_total", "result" => result).increment(1);
}

/// Record the number of stored key records.
pub fn record_keys_stored(count: usize) {
    gauge!("keygate_keys_stored").set(count as f64);
}
