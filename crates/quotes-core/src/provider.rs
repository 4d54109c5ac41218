//! Provider traits for fetching market data from upstream.
//!
//! This module defines the interface the cache core consumes:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`MarketDataProvider`] - Quotes, historical bars and instrument reference data
//!
//! Provider calls are assumed idempotent and safe to retry. The cache never
//! retries on its own; retry policy belongs to the provider or the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::{
    error::Result,
    granularity::Granularity,
    types::{Bar, Instrument, Market, Quote, Symbol},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Futu OpenD").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Returns the bar granularities supported by this provider.
    fn supported_granularities(&self) -> &[Granularity];
}

/// Upstream market data source.
#[async_trait]
pub trait MarketDataProvider: DataProvider {
    /// Fetches real-time quotes for a set of symbols.
    async fn fetch_quote(&self, symbols: &[Symbol]) -> Result<Vec<Quote>>;

    /// Fetches the bars of one series whose `time_key` lies in `[start, end)`.
    ///
    /// The returned set may be sparse (non-trading periods simply have no bar).
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    /// Fetches instrument reference data for a market.
    async fn fetch_basic_info(&self, market: Market) -> Result<Vec<Instrument>>;
}
