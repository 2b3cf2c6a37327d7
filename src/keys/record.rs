//! Key record types and key generation.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix carried by every issued key.
pub const KEY_PREFIX: &str = "proxy_live_";

/// Random bytes behind each key (rendered as hex).
const KEY_ENTROPY_BYTES: usize = 16;

/// Opaque identifier of a key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Uuid);

impl KeyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for KeyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Supported key lifetimes, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Hour,
    Day,
    Week,
    Month,
    Unlimited,
}

impl Lifetime {
    pub const fn as_secs(self) -> u64 {
        match self {
            Lifetime::Hour => 3_600,
            Lifetime::Day => 86_400,
            Lifetime::Week => 604_800,
            Lifetime::Month => 2_592_000,
            Lifetime::Unlimited => 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported lifetime {0}s (expected 3600, 86400, 604800, 2592000 or 0)")]
pub struct UnsupportedLifetime(pub u64);

impl TryFrom<u64> for Lifetime {
    type Error = UnsupportedLifetime;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            3_600 => Ok(Lifetime::Hour),
            86_400 => Ok(Lifetime::Day),
            604_800 => Ok(Lifetime::Week),
            2_592_000 => Ok(Lifetime::Month),
            0 => Ok(Lifetime::Unlimited),
            other => Err(UnsupportedLifetime(other)),
        }
    }
}

/// A stored access key.
///
/// Records are immutable once issued; the only lifecycle operations are
/// creation and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: KeyId,
    pub key: String,
    pub region: String,
    #[serde(rename = "lifetime")]
    pub lifetime_seconds: u64,
    /// Unix seconds at issuance. Absent on records imported without one.
    #[serde(default, rename = "issuedAt", skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<u64>,
}

impl KeyRecord {
    /// Issue a new record with a freshly generated key.
    pub fn issue(region: impl Into<String>, lifetime: Lifetime) -> Self {
        Self {
            id: KeyId::new(),
            key: generate_key(),
            region: region.into(),
            lifetime_seconds: lifetime.as_secs(),
            issued_at: Some(unix_now()),
        }
    }

    /// Whether the record's lifetime has elapsed at `now` (unix seconds).
    ///
    /// Unlimited records and records without an issuance time never expire.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.issued_at {
            Some(issued) if self.lifetime_seconds > 0 => {
                now > issued.saturating_add(self.lifetime_seconds)
            }
            _ => false,
        }
    }
}

/// Generate a new high-entropy key string.
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let mut key = String::with_capacity(KEY_PREFIX.len() + KEY_ENTROPY_BYTES * 2);
    key.push_str(KEY_PREFIX);
    for b in bytes {
        key.push_str(&format!("{:02x}", b));
    }
    key
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
