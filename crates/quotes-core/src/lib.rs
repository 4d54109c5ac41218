#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/quotes/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the quotes market-data cache.
//!
//! This crate provides the shared vocabulary of the cache workspace:
//!
//! - [`MarketDataProvider`](provider::MarketDataProvider) - Upstream quote/bar/reference source
//! - [`TierStore`](tier::TierStore) - Uniform contract over cache tiers
//! - [`CacheKey`](key::CacheKey) and [`DataKind`](key::DataKind) - Deterministic keys and TTL policy
//! - [`RangeCoverage`](range::RangeCoverage) - Durable coverage of bar series
//! - [`DataError`](error::DataError) - Error taxonomy

/// Error types for cache and indicator operations.
pub mod error;
/// Bar granularity definitions.
pub mod granularity;
/// Cache keys, data kinds and TTL policy.
pub mod key;
/// Provider traits for fetching market data.
pub mod provider;
/// Time ranges and coverage bookkeeping.
pub mod range;
/// Cache tier trait and entry type.
pub mod tier;
/// Core data types (Symbol, Bar, Quote, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{DataError, Result};
pub use granularity::Granularity;
pub use key::{CacheKey, CacheKeyBuilder, DataKind, Ttl, TtlPolicy};
pub use provider::{DataProvider, MarketDataProvider};
pub use range::{RangeCoverage, TimeRange};
pub use tier::{CacheEntry, TierKind, TierStore};
pub use types::{Bar, Instrument, Market, Quote, Symbol, bars_to_frame};
