//! Incremental resolution of bar windows against durable range coverage.
//!
//! A request for `[start, end)` only fetches the parts of the window the
//! durable store does not already cover. Gaps are fetched concurrently, each
//! through its own single-flight key, and merged into the store under a
//! per-series lock so coverage updates never interleave.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::try_join_all;
use quotes_cache::{SingleFlight, SqliteStore};
use quotes_core::{
    Bar, DataError, Granularity, MarketDataProvider, RangeCoverage, Result, Symbol, TimeRange,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

type SeriesKey = (Symbol, Granularity);

/// Gap windows with the bars fetched for them.
type Fetched = Vec<(TimeRange, Arc<Vec<Bar>>)>;

/// Where a resolution step failed.
enum Failure {
    /// The durable store could not be read or written. Carries whatever was
    /// already fetched upstream.
    Durable(DataError, Fetched),
    /// The provider failed or timed out.
    Upstream(DataError),
}

/// Serves bar windows from the durable store, fetching only what is missing.
pub struct RangeResolver {
    store: Option<Arc<SqliteStore>>,
    provider: Arc<dyn MarketDataProvider>,
    flights: SingleFlight<String, Arc<Vec<Bar>>>,
    locks: DashMap<SeriesKey, Arc<Mutex<()>>>,
    upstream_timeout: Duration,
    clock: fn() -> DateTime<Utc>,
}

impl fmt::Debug for RangeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResolver")
            .field("store", &self.store.as_ref().map(|_| "sqlite"))
            .field("provider", &self.provider.name())
            .field("in_flight", &self.flights.in_flight())
            .field("upstream_timeout", &self.upstream_timeout)
            .finish_non_exhaustive()
    }
}

impl RangeResolver {
    /// Create a resolver. Without a store every window is served straight from
    /// the provider.
    #[must_use]
    pub fn new(
        store: Option<Arc<SqliteStore>>,
        provider: Arc<dyn MarketDataProvider>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            flights: SingleFlight::new(),
            locks: DashMap::new(),
            upstream_timeout,
            clock: Utc::now,
        }
    }

    /// Replace the clock used to decide which fetched periods have closed.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// The durable store, if one is attached.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<SqliteStore>> {
        self.store.as_ref()
    }

    /// Bars of one series with `time_key` in `range`, ascending, keeping the
    /// most recent `limit` when given.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if the provider does not serve
    /// `granularity`, and the provider's error (or
    /// [`DataError::UpstreamFetchFailed`] on timeout) if a gap cannot be fetched.
    #[instrument(skip(self), fields(symbol = %symbol, granularity = %granularity, range = %range))]
    pub async fn get_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        if !self.provider.supported_granularities().contains(&granularity) {
            return Err(DataError::InvalidParameter(format!(
                "{} does not serve {granularity} bars",
                self.provider.name()
            )));
        }

        let bars = match &self.store {
            Some(store) => match self.resolve(store, symbol, granularity, range).await {
                Ok(bars) => bars,
                Err(Failure::Upstream(e)) => return Err(e),
                Err(Failure::Durable(e, fetched)) => {
                    warn!(error = %e, "Durable store failed, serving window from provider");
                    self.fetch_remaining(symbol, granularity, range, fetched)
                        .await?
                }
            },
            None => self.fetch_direct(symbol, granularity, range).await?,
        };

        Ok(keep_last(bars, limit))
    }

    async fn resolve(
        &self,
        store: &SqliteStore,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
    ) -> std::result::Result<Vec<Bar>, Failure> {
        let coverage = store
            .load_coverage(symbol, granularity)
            .map_err(|e| Failure::Durable(e, Vec::new()))?;
        let gaps = coverage.gaps(&range);

        let mut fetched = Vec::new();
        if !gaps.is_empty() {
            debug!(gaps = gaps.len(), "Fetching uncovered windows");
            let bars = try_join_all(
                gaps.iter()
                    .map(|gap| self.fetch_gap(symbol, granularity, *gap)),
            )
            .await
            .map_err(Failure::Upstream)?;
            fetched = gaps.into_iter().zip(bars).collect();

            if let Err(e) = self.merge(store, symbol, granularity, &fetched).await {
                return Err(Failure::Durable(e, fetched));
            }
        }

        store
            .load_bars(symbol, granularity, &range)
            .map_err(|e| Failure::Durable(e, fetched))
    }

    /// Upsert fetched bars and extend coverage by the settled part of each gap.
    async fn merge(
        &self,
        store: &SqliteStore,
        symbol: &Symbol,
        granularity: Granularity,
        fetched: &[(TimeRange, Arc<Vec<Bar>>)],
    ) -> Result<()> {
        let lock = self.series_lock(symbol, granularity);
        let outcome = {
            let _guard = lock.lock().await;
            self.write_fetched(store, symbol, granularity, fetched)
        };
        drop(lock);

        // Drop the lock entry once no other request holds it.
        self.locks
            .remove_if(&(symbol.clone(), granularity), |_, lock| {
                Arc::strong_count(lock) == 1
            });
        outcome
    }

    fn write_fetched(
        &self,
        store: &SqliteStore,
        symbol: &Symbol,
        granularity: Granularity,
        fetched: &[(TimeRange, Arc<Vec<Bar>>)],
    ) -> Result<()> {
        let now = (self.clock)();
        let settled = now - granularity.period();
        let mut coverage: RangeCoverage = store.load_coverage(symbol, granularity)?;
        let mut written = 0;
        for (gap, bars) in fetched {
            written += store.upsert_bars(bars, now)?;
            coverage.insert(gap.clip_end(settled));
        }
        store.save_coverage(&coverage)?;

        debug!(
            written,
            intervals = coverage.intervals().len(),
            "Merged fetched bars"
        );
        Ok(())
    }

    fn series_lock(&self, symbol: &Symbol, granularity: Granularity) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry((symbol.clone(), granularity))
                .or_default()
                .value(),
        )
    }

    /// Fetch one window, joining an identical fetch already in flight.
    async fn fetch_gap(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        gap: TimeRange,
    ) -> Result<Arc<Vec<Bar>>> {
        let key = format!(
            "bars:{symbol}:{granularity}:{}-{}",
            gap.start.timestamp_millis(),
            gap.end.timestamp_millis()
        );
        let provider = Arc::clone(&self.provider);
        let timeout = self.upstream_timeout;
        let symbol = symbol.clone();

        self.flights
            .run(key, move || async move {
                debug!(symbol = %symbol, gap = %gap, provider = provider.name(), "Fetching bars");
                let bars = tokio::time::timeout(
                    timeout,
                    provider.fetch_bars(&symbol, granularity, gap.start, gap.end),
                )
                .await
                .map_err(|_| {
                    DataError::UpstreamFetchFailed(format!(
                        "fetch_bars {symbol} {gap} timed out after {timeout:?}"
                    ))
                })??;

                let mut bars: Vec<Bar> = bars
                    .into_iter()
                    .filter(|b| b.symbol == symbol && b.granularity == granularity)
                    .filter(|b| gap.contains(b.time_key))
                    .collect();
                bars.sort_by_key(|b| b.time_key);
                Ok(Arc::new(bars))
            })
            .await
    }

    /// Complete `range` from the provider around windows already fetched.
    async fn fetch_remaining(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
        fetched: Fetched,
    ) -> Result<Vec<Bar>> {
        let mut have = RangeCoverage::new(symbol.clone(), granularity);
        for (gap, _) in &fetched {
            have.insert(*gap);
        }
        let rest = have.gaps(&range);
        let more = try_join_all(
            rest.iter()
                .map(|gap| self.fetch_gap(symbol, granularity, *gap)),
        )
        .await?;

        let mut bars: Vec<Bar> = fetched
            .iter()
            .map(|(_, bars)| bars)
            .chain(&more)
            .flat_map(|bars| bars.iter().cloned())
            .filter(|b| range.contains(b.time_key))
            .collect();
        bars.sort_by_key(|b| b.time_key);
        bars.dedup_by_key(|b| b.time_key);
        Ok(bars)
    }

    async fn fetch_direct(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: TimeRange,
    ) -> Result<Vec<Bar>> {
        let bars = self.fetch_gap(symbol, granularity, range).await?;
        Ok(bars.as_ref().clone())
    }
}

fn keep_last(mut bars: Vec<Bar>, limit: Option<usize>) -> Vec<Bar> {
    match limit {
        Some(n) if bars.len() > n => bars.split_off(bars.len() - n),
        _ => bars,
    }
}
