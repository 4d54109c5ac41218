#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/quotes/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached market data and technical indicators.
//!
//! This crate re-exports the core types, cache tiers and indicator engine, and
//! adds the pieces that tie them to an upstream provider:
//!
//! - [`RangeResolver`] - Fetches only the uncovered parts of a bar window
//! - [`IndicatorCache`] - Memoizes indicator output by input fingerprint
//! - [`MarketDataService`] - Everything assembled from a [`CacheConfig`]
//!
//! # Features
//!
//! - `redis` - Shared remote cache tier (enabled by default)
//!
//! # Example
//!
//! ```rust,ignore
//! use quotes::{CacheConfig, Granularity, MarketDataService, Symbol, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> quotes::Result<()> {
//!     let service = MarketDataService::connect(&CacheConfig::from_env()?, provider).await?;
//!
//!     let quotes = service.get_quotes(&[Symbol::new("HK.00700")]).await?;
//!     println!("{:?}", quotes);
//!
//!     let stats = service.cache_stats().await;
//!     println!("degraded: {}", stats.degraded);
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use quotes_core::*;

// Cache tiers and orchestration
pub use quotes_cache::{
    CacheConfig, CacheStats, ClearScope, MemoryTier, RemoteConfig, SingleFlight, SqliteStore,
    TierStats, TieredCacheManager, TieredCacheManagerBuilder,
};
#[cfg(feature = "redis")]
pub use quotes_cache::RedisTier;

// Indicator engine
pub use quotes_ta::{
    Bias, CrossEvent, CrossKind, IndicatorBundle, IndicatorGroup, IndicatorName, IndicatorOutput,
    IndicatorParams, Signal, Summary, compute, compute_all,
};

mod indicator;
mod resolver;
mod service;

pub use indicator::{
    BarWindow, IndicatorBundleResult, IndicatorCache, IndicatorResult, bundle_fingerprint,
    fingerprint,
};
pub use resolver::RangeResolver;
pub use service::MarketDataService;

#[cfg(test)]
mod mock;
