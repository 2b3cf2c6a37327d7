//! Authenticated forwarding proxy.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → keys::validator (lookup presented key)
//!     → sanitizer.rs (strip hop-local headers)
//!     → dispatcher.rs (single outbound call, bounded redirects + timeout)
//!     → relay.rs (bounded buffering, strip upstream-leg headers)
//!     → ProxyResponse
//! ```
//!
//! `orchestrator.rs` drives the stages; `error.rs` maps every failure to
//! one status code.

pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod relay;
pub mod sanitizer;

pub use dispatcher::{HttpUpstream, OutboundRequest, Upstream};
pub use error::{DispatchError, ProxyError};
pub use orchestrator::{Authorized, ProxyRequest, ProxyService};
pub use relay::{ProxyResponse, UpstreamResponse};
pub use sanitizer::RequestSanitizer;
