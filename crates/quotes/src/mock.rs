//! Recording provider for tests.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use quotes_core::{
    Bar, DataError, DataProvider, Granularity, Instrument, Market, MarketDataProvider, Quote,
    Result, Symbol, TimeRange,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Serves one bar per period with `close` equal to the day of month plus the
/// hour, and records every call.
#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    bar_calls: Mutex<Vec<(Symbol, Granularity, TimeRange)>>,
    quote_calls: AtomicUsize,
    info_calls: AtomicUsize,
    delay: Option<Duration>,
    fail: AtomicBool,
    without_volume: bool,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn without_volume(mut self) -> Self {
        self.without_volume = true;
        self
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn bar_calls(&self) -> Vec<(Symbol, Granularity, TimeRange)> {
        self.bar_calls.lock().unwrap().clone()
    }

    pub(crate) fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DataError::Other("mock upstream down".to_string()));
        }
        Ok(())
    }
}

impl DataProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn description(&self) -> &str {
        "Recording provider for tests"
    }

    fn supported_granularities(&self) -> &[Granularity] {
        &[Granularity::Day, Granularity::Min60]
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn fetch_quote(&self, symbols: &[Symbol]) -> Result<Vec<Quote>> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(symbols
            .iter()
            .map(|s| Quote {
                symbol: s.clone(),
                last_price: 10.5,
                open: 10.0,
                high: 11.0,
                low: 9.5,
                prev_close: 10.0,
                volume: 1_000.0,
                turnover: 10_500.0,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            })
            .collect())
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.bar_calls
            .lock()
            .unwrap()
            .push((symbol.clone(), granularity, TimeRange { start, end }));
        self.pause().await?;

        // Bars start on multiples of the period since the epoch.
        let step = granularity.period().num_seconds();
        let mut ts = start.timestamp() + (step - start.timestamp().rem_euclid(step)) % step;
        let mut bars = Vec::new();
        while ts < end.timestamp() {
            let t = DateTime::from_timestamp(ts, 0).unwrap();
            let close = f64::from(t.day() + t.hour());
            let bar = Bar::new(symbol.clone(), granularity, t, close, close + 1.0, close - 1.0, close);
            bars.push(if self.without_volume {
                bar
            } else {
                bar.with_volume(100.0)
            });
            ts += step;
        }
        Ok(bars)
    }

    async fn fetch_basic_info(&self, market: Market) -> Result<Vec<Instrument>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(vec![Instrument::new(
            Symbol::new("HK.00700"),
            "Tencent",
            market,
            100,
            "STOCK",
        )])
    }
}
