//! Access keys.
//!
//! # Data Flow
//! ```text
//! POST /keys → store.rs (issue + persist KeyRecord)
//!
//! /proxy?apiKey=...
//!     → validator.rs (lookup with timeout, optional expiry check)
//!     → Authorized(KeyRecord) | Rejected(reason)
//! ```

pub mod record;
pub mod store;
pub mod validator;

pub use record::{KeyId, KeyRecord, Lifetime};
pub use store::{FileKeyStore, KeyStore, StoreError};
pub use validator::{KeyValidator, Rejection, Validation};
