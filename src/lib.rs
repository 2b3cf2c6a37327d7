//! Key-gated HTTP forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ http::request ──▶ proxy::ProxyService ──▶ Target
//!                    │                                  │      │
//!                    │                          keys::validator │
//!                    │                                  │   proxy::dispatcher
//!                    ▼                                  ▼      │
//!               admin (/keys) ──────────────▶ keys::KeyStore   │
//!                                                              ▼
//!     Client ◀── http::response ◀────────────────────── proxy::relay
//! ```
//!
//! Cross-cutting: `config` (TOML + validation), `observability` (tracing,
//! Prometheus), `lifecycle` (signals, graceful shutdown).

pub mod admin;
pub mod config;
pub mod http;
pub mod keys;
pub mod lifecycle;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
