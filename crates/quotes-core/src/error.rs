//! Error types for cache and indicator operations.
//!
//! This module defines [`DataError`], which covers every failure the cache core can
//! produce. The type is `Clone` because a single upstream outcome is handed to every
//! caller waiting on the same in-flight fetch.

use thiserror::Error;

use crate::tier::TierKind;

/// Errors that can occur while fetching, caching or analysing market data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A cache tier could not serve the request (timeout, connection loss, lock poisoning).
    ///
    /// The tiered manager absorbs this error and moves on to the next tier; it is never
    /// returned from a public cache operation.
    #[error("{tier} tier unavailable: {reason}")]
    TierUnavailable {
        /// The tier that failed.
        tier: TierKind,
        /// Human readable failure description.
        reason: String,
    },

    /// The upstream provider failed or timed out.
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    /// The series is too short for the requested indicator.
    #[error("Insufficient data for {indicator}: need {required} bars, got {provided}")]
    InsufficientData {
        /// Indicator that was requested.
        indicator: String,
        /// Minimum number of bars required.
        required: usize,
        /// Number of usable bars provided.
        provided: usize,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error interacting with a cache backend.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Error encoding or decoding a cached payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Builds a [`DataError::TierUnavailable`] for `tier`.
    #[must_use]
    pub fn tier_unavailable(tier: TierKind, reason: impl Into<String>) -> Self {
        Self::TierUnavailable {
            tier,
            reason: reason.into(),
        }
    }

    /// Returns true if this error only reports a degraded tier.
    #[must_use]
    pub const fn is_tier_unavailable(&self) -> bool {
        matches!(self, Self::TierUnavailable { .. })
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
