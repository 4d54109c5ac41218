#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/quotes/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache tiers and orchestration for the quotes market-data cache.
//!
//! This crate provides implementations of the [`TierStore`] trait from `quotes-core`
//! and the manager that stacks them:
//!
//! - [`MemoryTier`] - Bounded in-process LRU
//! - [`RedisTier`] - Shared remote tier (requires `redis` feature)
//! - [`SqliteStore`] - Durable tier for bars, coverage and keyed records (requires `sqlite` feature)
//! - [`TieredCacheManager`] - Read-through/write-through across tiers with single-flight loads

/// Cache configuration.
pub mod config;
/// Single-flight load coordination.
pub mod flight;
/// Tiered cache manager.
pub mod manager;
/// In-memory cache tier.
pub mod memory;
/// Cache statistics.
pub mod stats;

/// Redis-based remote tier.
#[cfg(feature = "redis")]
pub mod remote;

/// SQLite-based durable tier.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use quotes_core::TierStore;

pub use config::{CacheConfig, RemoteConfig};
pub use flight::SingleFlight;
pub use manager::{ClearScope, TieredCacheManager, TieredCacheManagerBuilder};
pub use memory::MemoryTier;
pub use stats::{CacheStats, TierStats};

#[cfg(feature = "redis")]
pub use remote::RedisTier;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
