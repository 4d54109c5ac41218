//! Market data service assembled from configuration.

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use polars::prelude::DataFrame;
use quotes_cache::{
    CacheConfig, CacheStats, ClearScope, MemoryTier, SqliteStore, TieredCacheManager,
};
use quotes_core::{
    Bar, CacheKey, Granularity, Instrument, Market, MarketDataProvider, Quote, Result,
    Symbol, TierStore, TimeRange, bars_to_frame,
};
use quotes_ta::{IndicatorName, IndicatorParams};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::indicator::{BarWindow, IndicatorBundleResult, IndicatorCache, IndicatorResult};
use crate::resolver::RangeResolver;

/// Quotes, bars, reference data and indicators served through the tiered cache.
///
/// Every tier is optional at runtime: an unreachable remote cache or an
/// unopenable database is logged once and the service keeps working with the
/// tiers that remain.
#[derive(Clone)]
pub struct MarketDataService {
    cache: TieredCacheManager,
    provider: Arc<dyn MarketDataProvider>,
    resolver: Arc<RangeResolver>,
    indicators: IndicatorCache,
}

impl fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketDataService")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl MarketDataService {
    /// Build the tiers described by `config` and start background maintenance.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`](quotes_core::DataError::InvalidParameter)
    /// if the memory tier settings are invalid. Remote and durable tier
    /// failures only degrade the service.
    pub async fn connect(
        config: &CacheConfig,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Result<Self> {
        let memory = MemoryTier::with_shards(config.memory_capacity, config.memory_shards)?;
        let mut builder = TieredCacheManager::builder()
            .tier(Arc::new(memory))
            .upstream_timeout(config.upstream_timeout());
        let mut missing = false;

        if let Some(remote) = &config.remote {
            #[cfg(feature = "redis")]
            match quotes_cache::RedisTier::connect(remote).await {
                Ok(tier) => builder = builder.tier(Arc::new(tier)),
                Err(e) => {
                    warn!(error = %e, "Remote cache unavailable, continuing without it");
                    missing = true;
                }
            }
            #[cfg(not(feature = "redis"))]
            {
                warn!(url = %remote.url, "Remote cache configured but the redis feature is disabled");
                missing = true;
            }
        }

        let store = match SqliteStore::open(&config.sqlite_path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(
                    path = %config.sqlite_path.display(),
                    error = %e,
                    "Durable cache unavailable, continuing without it"
                );
                missing = true;
                None
            }
        };
        if let Some(store) = &store {
            builder = builder.tier(Arc::clone(store) as Arc<dyn TierStore>);
        }

        let cache = builder.missing_tiers(missing).build();
        cache.spawn_maintenance(config.maintenance_interval());
        info!(
            provider = provider.name(),
            degraded = missing,
            "Market data service ready"
        );

        Ok(Self::from_parts(cache, provider, store))
    }

    /// Assemble a service from an existing manager and durable store.
    #[must_use]
    pub fn from_parts(
        cache: TieredCacheManager,
        provider: Arc<dyn MarketDataProvider>,
        store: Option<Arc<SqliteStore>>,
    ) -> Self {
        let resolver = Arc::new(RangeResolver::new(
            store,
            Arc::clone(&provider),
            cache.upstream_timeout(),
        ));
        Self::with_resolver(cache, provider, resolver)
    }

    /// Assemble a service around a preconfigured resolver.
    #[must_use]
    pub fn with_resolver(
        cache: TieredCacheManager,
        provider: Arc<dyn MarketDataProvider>,
        resolver: Arc<RangeResolver>,
    ) -> Self {
        let indicators = IndicatorCache::new(cache.clone(), Arc::clone(&resolver));
        Self {
            cache,
            provider,
            resolver,
            indicators,
        }
    }

    /// The underlying cache manager, for custom `get_or_fetch` loads.
    #[must_use]
    pub const fn cache(&self) -> &TieredCacheManager {
        &self.cache
    }

    /// Latest quotes for `symbols`.
    ///
    /// # Errors
    /// Returns the provider's error on a cache miss that cannot be loaded.
    #[instrument(skip(self), fields(count = symbols.len()))]
    pub async fn get_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let provider = Arc::clone(&self.provider);
        let symbols = symbols.to_vec();
        self.cache
            .get_or_fetch(&CacheKey::quotes(&symbols), move || async move {
                provider.fetch_quote(&symbols).await
            })
            .await
    }

    /// Instrument reference data for `market`.
    ///
    /// # Errors
    /// Returns the provider's error on a cache miss that cannot be loaded.
    #[instrument(skip(self))]
    pub async fn get_basic_info(&self, market: Market) -> Result<Vec<Instrument>> {
        let provider = Arc::clone(&self.provider);
        self.cache
            .get_or_fetch(&CacheKey::basic_info(market), move || async move {
                provider.fetch_basic_info(market).await
            })
            .await
    }

    /// Bars of one series in `range`, ascending, keeping the most recent `limit`.
    ///
    /// # Errors
    /// See [`IndicatorCache::get_bars`].
    pub async fn get_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>> {
        self.indicators
            .get_bars(symbol, granularity, range, limit)
            .await
    }

    /// Same window as [`get_bars`](Self::get_bars) as a DataFrame.
    ///
    /// # Errors
    /// See [`get_bars`](Self::get_bars); also fails if the frame cannot be built.
    pub async fn get_bars_frame(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<DataFrame> {
        let bars = self.get_bars(symbol, granularity, range, limit).await?;
        bars_to_frame(&bars)
    }

    /// Indicator `name` over `window`, memoized by its exact inputs.
    ///
    /// # Errors
    /// See [`IndicatorCache::get_indicator`].
    pub async fn get_indicator(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        window: &BarWindow,
        name: IndicatorName,
        params: &IndicatorParams,
    ) -> Result<IndicatorResult> {
        self.indicators
            .get_indicator(symbol, granularity, window, name, params)
            .await
    }

    /// Every indicator over `window`, grouped by family with a summary.
    ///
    /// # Errors
    /// See [`IndicatorCache::get_all_indicators`].
    pub async fn get_all_indicators(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        window: &BarWindow,
    ) -> Result<IndicatorBundleResult> {
        self.indicators
            .get_all_indicators(symbol, granularity, window)
            .await
    }

    /// Per-tier and load statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Empty the tiers selected by `scope`.
    pub async fn clear_cache(&self, scope: ClearScope) {
        self.cache.clear(scope).await;
    }

    /// Drop the stored bars and coverage of one series. Returns the number of
    /// bars removed.
    ///
    /// Windows already held by the memory and remote tiers expire with their TTL.
    ///
    /// # Errors
    /// Returns [`DataError::Cache`](quotes_core::DataError::Cache) if the
    /// durable store cannot be written.
    #[instrument(skip(self), fields(symbol = %symbol, granularity = %granularity))]
    pub async fn invalidate_series(&self, symbol: &Symbol, granularity: Granularity) -> Result<usize> {
        let Some(store) = self.resolver.store() else {
            return Ok(0);
        };
        let removed = store.invalidate_series(symbol, granularity)?;
        info!(removed, "Invalidated bar series");
        Ok(removed)
    }

    /// Warm the durable store with the last `days` days of bars for each symbol.
    ///
    /// Symbols that fail are logged and skipped. Returns the number of symbols
    /// warmed.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn preload(&self, symbols: &[Symbol], granularity: Granularity, days: u32) -> usize {
        let now = Utc::now();
        let range = TimeRange {
            start: now - TimeDelta::days(i64::from(days)),
            end: now,
        };
        info!(days, "Preloading bar series");

        let outcomes = join_all(symbols.iter().map(|symbol| async move {
            let outcome = self.resolver.get_bars(symbol, granularity, range, None).await;
            (symbol, outcome)
        }))
        .await;

        let mut warmed = 0;
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(bars) => {
                    debug!(symbol = %symbol, bars = bars.len(), "Preloaded");
                    warmed += 1;
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Preload failed"),
            }
        }
        info!(warmed, "Preload complete");
        warmed
    }

    /// Stop background maintenance.
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use chrono::{DateTime, TimeZone};
    use quotes_cache::RemoteConfig;
    use quotes_core::TierKind;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn service(provider: &Arc<MockProvider>) -> MarketDataService {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let cache = TieredCacheManager::builder()
            .tier(Arc::new(MemoryTier::new(100).unwrap()))
            .tier(Arc::clone(&store) as Arc<dyn TierStore>)
            .build();
        let provider: Arc<dyn MarketDataProvider> = Arc::clone(provider) as _;
        let resolver = Arc::new(
            RangeResolver::new(Some(store), Arc::clone(&provider), cache.upstream_timeout())
                .with_clock(later),
        );
        MarketDataService::with_resolver(cache, provider, resolver)
    }

    #[tokio::test]
    async fn test_quotes_are_cached_by_symbol_set() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);

        let a = service
            .get_quotes(&[Symbol::new("B"), Symbol::new("A")])
            .await
            .unwrap();
        let b = service
            .get_quotes(&[Symbol::new("A"), Symbol::new("B")])
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(provider.quote_calls(), 1);
        assert!(service.get_quotes(&[]).await.unwrap().is_empty());
        assert_eq!(provider.quote_calls(), 1);
    }

    #[tokio::test]
    async fn test_basic_info_survives_memory_clear() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);

        let first = service.get_basic_info(Market::Hk).await.unwrap();
        service.clear_cache(ClearScope::Memory).await;
        let second = service.get_basic_info(Market::Hk).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.info_calls(), 1);
        let stats = service.cache_stats().await;
        assert_eq!(stats.tier(TierKind::Durable).unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_bars_and_frame() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);
        let symbol = Symbol::new("AAPL");
        let range = TimeRange::new(day(1), day(11)).unwrap();

        let bars = service
            .get_bars(&symbol, Granularity::Day, range, Some(5))
            .await
            .unwrap();
        assert_eq!(bars.len(), 5);
        assert_eq!(bars[4].time_key, day(10));

        let frame = service
            .get_bars_frame(&symbol, Granularity::Day, range, None)
            .await
            .unwrap();
        assert_eq!(frame.height(), 10);
        assert_eq!(provider.bar_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_series_forces_refetch() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);
        let symbol = Symbol::new("AAPL");
        let range = TimeRange::new(day(1), day(11)).unwrap();

        service
            .get_bars(&symbol, Granularity::Day, range, None)
            .await
            .unwrap();
        assert_eq!(service.invalidate_series(&symbol, Granularity::Day).await.unwrap(), 10);

        service.clear_cache(ClearScope::Memory).await;
        let bars = service
            .get_bars(&symbol, Granularity::Day, range, None)
            .await
            .unwrap();
        assert_eq!(bars.len(), 10);
        assert_eq!(provider.bar_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_preload_skips_failing_symbols() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);

        let warmed = service
            .preload(&[Symbol::new("AAPL"), Symbol::new("MSFT")], Granularity::Day, 10)
            .await;
        assert_eq!(warmed, 2);

        provider.set_failing(true);
        let warmed = service
            .preload(&[Symbol::new("TSLA")], Granularity::Week, 10)
            .await;
        assert_eq!(warmed, 0);
    }

    #[tokio::test]
    async fn test_indicator_through_service() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);
        let window = BarWindow::new(TimeRange::new(day(1), day(29)).unwrap());

        let result = service
            .get_indicator(
                &Symbol::new("AAPL"),
                Granularity::Day,
                &window,
                IndicatorName::Bollinger,
                &IndicatorName::Bollinger.default_params(),
            )
            .await
            .unwrap();
        assert_eq!(result.output.series["middle"].len(), 28);
        assert!(result.output.current("bandwidth").is_some());
    }

    #[tokio::test]
    async fn test_all_indicators_through_service() {
        let provider = Arc::new(MockProvider::new());
        let service = service(&provider);
        let window = BarWindow::new(TimeRange::new(day(1), day(1) + TimeDelta::days(60)).unwrap());
        let symbol = Symbol::new("AAPL");

        let result = service
            .get_all_indicators(&symbol, Granularity::Day, &window)
            .await
            .unwrap();
        let summary = &result.bundle.summary;
        assert_eq!(
            summary.bullish + summary.bearish + summary.neutral,
            result.bundle.outputs().count()
        );

        // The bundle and a plain bar request share one upstream fetch.
        let bars = service
            .get_bars(&symbol, Granularity::Day, window.range, None)
            .await
            .unwrap();
        assert_eq!(bars.len(), 60);
        assert_eq!(provider.bar_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_degrades_without_remote() {
        let dir = std::env::temp_dir().join(format!("quotes-service-{}", std::process::id()));
        let config = CacheConfig::default()
            .with_sqlite_path(dir.join("cache.db"))
            .with_remote(RemoteConfig::new("redis://127.0.0.1:1/"));
        let provider = Arc::new(MockProvider::new());

        let service = MarketDataService::connect(&config, provider)
            .await
            .unwrap();
        let stats = service.cache_stats().await;
        assert!(stats.degraded);
        assert!(stats.tier(TierKind::Durable).is_some());
        assert!(stats.tier(TierKind::Remote).is_none());

        let quotes = service.get_quotes(&[Symbol::new("AAPL")]).await.unwrap();
        assert_eq!(quotes.len(), 1);

        service.shutdown();
        let _ = std::fs::remove_dir_all(dir);
    }
}
