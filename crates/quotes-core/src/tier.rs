//! Tier trait for cache storage layers.
//!
//! This module defines the [`TierStore`] trait that provides a uniform
//! get/put/delete interface over the in-process, remote and durable tiers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{
    error::Result,
    key::{CacheKey, DataKind, Ttl},
};

/// Identifies a cache tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierKind {
    /// In-process bounded map.
    Memory,
    /// Shared network key-value cache.
    Remote,
    /// Embedded durable store.
    Durable,
}

impl TierKind {
    /// Lower-case tier name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Remote => "remote",
            Self::Durable => "durable",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held by one tier.
///
/// Each tier owns its own copy of the payload; entries are only ever replaced whole.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Key the value is stored under.
    pub key: CacheKey,
    /// Serialized payload.
    pub value: Vec<u8>,
    /// When the value was written (or, for tiers that only report a remaining TTL,
    /// when it was read).
    pub stored_at: DateTime<Utc>,
    /// Lifetime measured from `stored_at`.
    pub ttl: Ttl,
    /// Tier that produced the entry.
    pub origin: TierKind,
}

impl CacheEntry {
    /// Lifetime left at `now`; `Ttl::Forever` for entries that never expire.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Ttl {
        match self.ttl {
            Ttl::Forever => Ttl::Forever,
            Ttl::Expires(ttl) => {
                let age = (now - self.stored_at).to_std().unwrap_or(Duration::ZERO);
                Ttl::Expires(ttl.saturating_sub(age))
            }
        }
    }

    /// Lifetime left now.
    #[must_use]
    pub fn remaining(&self) -> Ttl {
        self.remaining_at(Utc::now())
    }
}

/// Storage layer in the cache hierarchy.
///
/// Implementations must never block indefinitely: network-backed tiers apply a
/// short timeout and report [`DataError::TierUnavailable`](crate::DataError::TierUnavailable)
/// instead of stalling the caller.
#[async_trait]
pub trait TierStore: Send + Sync + fmt::Debug {
    /// Which tier this is.
    fn kind(&self) -> TierKind;

    /// Returns true if this tier stores values of the given kind.
    fn accepts(&self, kind: DataKind) -> bool {
        let _ = kind;
        true
    }

    /// Retrieves a live entry.
    ///
    /// Returns `Ok(Some(entry))` on a hit and `Ok(None)` on a miss or expiry.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Stores a payload, replacing any existing entry.
    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Ttl) -> Result<()>;

    /// Removes an entry. Returns true if something was removed.
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Number of entries currently held.
    async fn size(&self) -> Result<usize>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;

    /// Drops expired entries. Returns the number removed.
    async fn purge_expired(&self) -> Result<usize>;
}
