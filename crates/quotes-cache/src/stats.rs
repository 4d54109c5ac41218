//! Cache statistics snapshots.

use quotes_core::TierKind;
use serde::Serialize;

/// Counters for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// Which tier.
    pub tier: TierKind,
    /// Entries held, or `None` if the tier could not report it.
    pub size: Option<usize>,
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Failed operations.
    pub errors: u64,
    /// Whether the last operation against the tier succeeded.
    pub available: bool,
}

impl TierStats {
    /// Hit ratio over all lookups, if any were made.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }
}

/// Snapshot of the tiered cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Per-tier counters, in priority order.
    pub tiers: Vec<TierStats>,
    /// Upstream loads currently pending.
    pub in_flight: usize,
    /// Upstream loads started.
    pub loads: u64,
    /// Upstream loads that failed or timed out.
    pub load_failures: u64,
    /// True when a configured tier is missing or currently unavailable.
    pub degraded: bool,
}

impl CacheStats {
    /// Counters of one tier, if configured.
    #[must_use]
    pub fn tier(&self, kind: TierKind) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.tier == kind)
    }
}
