//! Indicator results memoized by a fingerprint of their exact inputs.

use chrono::{DateTime, TimeDelta, Utc};
use quotes_cache::TieredCacheManager;
use quotes_core::{Bar, CacheKey, DataKind, Granularity, Result, Symbol, TimeRange};
use quotes_ta::{
    IndicatorBundle, IndicatorName, IndicatorOutput, IndicatorParams, Inputs, bundle_params,
    compute, compute_all,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::resolver::RangeResolver;

/// Indicator output together with the fingerprint of the inputs it was computed from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    /// Hex SHA-256 over the indicator, its parameters and the consumed bar fields.
    pub fingerprint: String,
    /// Computed output.
    pub output: IndicatorOutput,
}

/// Every indicator over one window, with the fingerprint of its inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundleResult {
    /// Hex SHA-256 over the bundle parameters and every bar field.
    pub fingerprint: String,
    /// Grouped outputs and summary.
    pub bundle: IndicatorBundle,
}

/// Bar window an indicator is evaluated over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarWindow {
    /// Time range of the bars.
    pub range: TimeRange,
    /// Keep only the most recent bars.
    pub limit: Option<usize>,
}

impl BarWindow {
    /// Every bar in `range`.
    #[must_use]
    pub const fn new(range: TimeRange) -> Self {
        Self { range, limit: None }
    }

    /// The `days` calendar days ending at `now`.
    #[must_use]
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self::new(TimeRange {
            start: now - TimeDelta::days(i64::from(days)),
            end: now,
        })
    }

    /// Keep only the most recent `limit` bars.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Fingerprint of an indicator evaluation.
///
/// Covers the indicator name, the canonical JSON of its parameters and, per
/// bar, the time key and close plus high/low and volume when the indicator
/// reads them. Any change to a consumed field changes the fingerprint.
///
/// # Errors
/// Returns [`DataError::Parse`](quotes_core::DataError::Parse) if the
/// parameters cannot be encoded.
pub fn fingerprint(name: IndicatorName, params: &IndicatorParams, bars: &[Bar]) -> Result<String> {
    Ok(digest(
        name.as_str(),
        &params.canonical_json()?,
        name.inputs(),
        bars,
    ))
}

/// Fingerprint of a full indicator bundle, which reads every bar field.
///
/// # Errors
/// Returns [`DataError::Parse`](quotes_core::DataError::Parse) if the
/// parameters cannot be encoded.
pub fn bundle_fingerprint(bars: &[Bar]) -> Result<String> {
    let params = bundle_params()
        .iter()
        .map(IndicatorParams::canonical_json)
        .collect::<Result<Vec<_>>>()?
        .join("\n");
    let inputs = Inputs {
        high_low: true,
        volume: true,
    };
    Ok(digest("bundle", &params, inputs, bars))
}

fn digest(label: &str, params: &str, inputs: Inputs, bars: &[Bar]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update([0]);
    hasher.update(params.as_bytes());
    hasher.update([0]);

    for bar in bars {
        hasher.update(bar.time_key.timestamp_millis().to_be_bytes());
        hasher.update(bar.close.to_bits().to_be_bytes());
        if inputs.high_low {
            hasher.update(bar.high.to_bits().to_be_bytes());
            hasher.update(bar.low.to_bits().to_be_bytes());
        }
        if inputs.volume {
            match bar.volume {
                Some(volume) => {
                    hasher.update([1]);
                    hasher.update(volume.to_bits().to_be_bytes());
                }
                None => hasher.update([0]),
            }
        }
    }

    hex::encode(hasher.finalize())
}

/// Serves indicators through the tiered cache.
#[derive(Debug, Clone)]
pub struct IndicatorCache {
    cache: TieredCacheManager,
    resolver: Arc<RangeResolver>,
}

impl IndicatorCache {
    /// Create a wrapper over `cache`, resolving bars with `resolver`.
    #[must_use]
    pub const fn new(cache: TieredCacheManager, resolver: Arc<RangeResolver>) -> Self {
        Self { cache, resolver }
    }

    /// Evaluate `name` over the bars of `window`, reusing a cached result when
    /// the same bars and parameters were seen before.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`](quotes_core::DataError::InvalidParameter)
    /// for bad parameters (before any fetch),
    /// [`DataError::InsufficientData`](quotes_core::DataError::InsufficientData)
    /// when the window is too short, and any error from resolving the bars.
    #[instrument(skip(self, window, params), fields(symbol = %symbol, granularity = %granularity, indicator = %name))]
    pub async fn get_indicator(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        window: &BarWindow,
        name: IndicatorName,
        params: &IndicatorParams,
    ) -> Result<IndicatorResult> {
        params.validate_for(name)?;

        let bars = self
            .get_bars(symbol, granularity, window.range, window.limit)
            .await?;
        let fingerprint = fingerprint(name, params, &bars)?;
        let key = indicator_key(symbol, granularity, &fingerprint);
        debug!(key = %key, bars = bars.len(), "Resolved indicator inputs");

        let params = params.clone();
        self.cache
            .get_or_fetch(&key, move || async move {
                let output = compute(name, &bars, &params)?;
                Ok(IndicatorResult {
                    fingerprint,
                    output,
                })
            })
            .await
    }

    /// Every indicator with default parameters over `window`, grouped by
    /// family with a summary, reusing a cached bundle for identical bars.
    ///
    /// # Errors
    /// Returns [`DataError::InsufficientData`](quotes_core::DataError::InsufficientData)
    /// when no indicator can be computed, and any error from resolving the bars.
    #[instrument(skip(self, window), fields(symbol = %symbol, granularity = %granularity))]
    pub async fn get_all_indicators(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        window: &BarWindow,
    ) -> Result<IndicatorBundleResult> {
        let bars = self
            .get_bars(symbol, granularity, window.range, window.limit)
            .await?;
        let fingerprint = bundle_fingerprint(&bars)?;
        let key = indicator_key(symbol, granularity, &fingerprint);
        debug!(key = %key, bars = bars.len(), "Resolved bundle inputs");

        self.cache
            .get_or_fetch(&key, move || async move {
                let bundle = compute_all(&bars)?;
                Ok(IndicatorBundleResult {
                    fingerprint,
                    bundle,
                })
            })
            .await
    }

    /// Bars of one series in `range`, ascending, keeping the most recent `limit`.
    ///
    /// Recently served windows are answered from the memory and remote tiers;
    /// everything else goes through the range resolver. A window reaching the
    /// present is therefore refetched at most once per bar TTL.
    ///
    /// # Errors
    /// See [`RangeResolver::get_bars`].
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
        let key = CacheKey::builder(DataKind::Bars)
            .symbol(symbol)
            .granularity(granularity)
            .param("start", range.start.timestamp_millis())
            .param("end", range.end.timestamp_millis())
            .param("limit", limit.map_or_else(|| "all".to_string(), |n| n.to_string()))
            .build();

        let resolver = Arc::clone(&self.resolver);
        let symbol = symbol.clone();
        self.cache
            .get_or_fetch(&key, move || async move {
                resolver.get_bars(&symbol, granularity, range, limit).await
            })
            .await
    }
}

fn indicator_key(symbol: &Symbol, granularity: Granularity, fingerprint: &str) -> CacheKey {
    CacheKey::builder(DataKind::Indicator)
        .symbol(symbol)
        .granularity(granularity)
        .param("fp", fingerprint)
        .build()
}
