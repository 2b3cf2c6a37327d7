//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, limits)
//!     → request.rs (query parameters, bounded body read)
//!     → [proxy::ProxyService validates, dispatches, relays]
//!     → response.rs (JSON error bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::{json_error, ErrorBody};
pub use server::{AppState, HttpServer};
