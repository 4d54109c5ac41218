//! Every indicator at once, grouped by family, with an overall reading.

use quotes_core::{Bar, DataError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::engine::{IndicatorOutput, compute};
use crate::params::{IndicatorGroup, IndicatorName, IndicatorParams};
use crate::signal::Bias;

/// Bars scanned for support and resistance.
pub const SUPPORT_WINDOW: usize = 20;

/// Default-parameter outputs of every indicator the bars allow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBundle {
    /// Outputs by family, each in [`IndicatorName::ALL`] order.
    pub groups: BTreeMap<IndicatorGroup, Vec<IndicatorOutput>>,
    /// Indicators that could not be computed, with the reason.
    pub unavailable: BTreeMap<IndicatorName, String>,
    /// Overall reading.
    pub summary: Summary,
}

impl IndicatorBundle {
    /// Output of one indicator, if it was computed.
    #[must_use]
    pub fn get(&self, name: IndicatorName) -> Option<&IndicatorOutput> {
        self.groups
            .get(&name.group())?
            .iter()
            .find(|output| output.name == name)
    }

    /// Every computed output.
    pub fn outputs(&self) -> impl Iterator<Item = &IndicatorOutput> {
        self.groups.values().flatten()
    }
}

/// Overall reading of a bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Majority lean of the trend indicators.
    pub overall_trend: Bias,
    /// Majority lean of the oscillators and MACD.
    pub short_term: Bias,
    /// Computed indicators leaning bullish.
    pub bullish: usize,
    /// Computed indicators leaning bearish.
    pub bearish: usize,
    /// Computed indicators with no lean.
    pub neutral: usize,
    /// Lowest low of the last [`SUPPORT_WINDOW`] bars.
    pub support: Option<f64>,
    /// Highest high of the last [`SUPPORT_WINDOW`] bars.
    pub resistance: Option<f64>,
}

/// Parameters the bundle evaluates, one per indicator in [`IndicatorName::ALL`] order.
#[must_use]
pub fn bundle_params() -> Vec<IndicatorParams> {
    IndicatorName::ALL
        .iter()
        .map(IndicatorName::default_params)
        .collect()
}

/// Evaluate every indicator with its default parameters.
///
/// Indicators the bars are too short for, or that need volume the bars lack,
/// are listed in [`IndicatorBundle::unavailable`].
///
/// # Errors
/// Returns [`DataError::InsufficientData`] for the least demanding indicator
/// when none can be computed.
pub fn compute_all(bars: &[Bar]) -> Result<IndicatorBundle> {
    let mut groups: BTreeMap<IndicatorGroup, Vec<IndicatorOutput>> = BTreeMap::new();
    let mut unavailable = BTreeMap::new();
    let mut least_demanding: Option<(usize, DataError)> = None;

    for name in IndicatorName::ALL {
        match compute(name, bars, &name.default_params()) {
            Ok(output) => groups.entry(name.group()).or_default().push(output),
            Err(e) => {
                let DataError::InsufficientData { required, .. } = e else {
                    return Err(e);
                };
                trace!(indicator = %name, error = %e, "Skipped indicator");
                unavailable.insert(name, e.to_string());
                if least_demanding.as_ref().is_none_or(|(r, _)| required < *r) {
                    least_demanding = Some((required, e));
                }
            }
        }
    }

    if groups.is_empty() {
        if let Some((_, e)) = least_demanding {
            return Err(e);
        }
    }

    let summary = summarize(&groups, bars);
    debug!(
        computed = IndicatorName::ALL.len() - unavailable.len(),
        trend = ?summary.overall_trend,
        "Computed indicator bundle"
    );
    Ok(IndicatorBundle {
        groups,
        unavailable,
        summary,
    })
}

fn lean<'a>(outputs: impl IntoIterator<Item = &'a IndicatorOutput>) -> Bias {
    let (mut up, mut down) = (0usize, 0usize);
    for output in outputs {
        match output.signal.bias() {
            Bias::Bullish => up += 1,
            Bias::Bearish => down += 1,
            Bias::Neutral => {}
        }
    }
    match up.cmp(&down) {
        std::cmp::Ordering::Greater => Bias::Bullish,
        std::cmp::Ordering::Less => Bias::Bearish,
        std::cmp::Ordering::Equal => Bias::Neutral,
    }
}

fn summarize(groups: &BTreeMap<IndicatorGroup, Vec<IndicatorOutput>>, bars: &[Bar]) -> Summary {
    let group = |g: IndicatorGroup| groups.get(&g).into_iter().flatten();

    let overall_trend = lean(group(IndicatorGroup::Trend));
    let short_term = lean(
        group(IndicatorGroup::Momentum)
            .chain(group(IndicatorGroup::Trend).filter(|o| o.name == IndicatorName::Macd)),
    );

    let (mut bullish, mut bearish, mut neutral) = (0, 0, 0);
    for output in groups.values().flatten() {
        match output.signal.bias() {
            Bias::Bullish => bullish += 1,
            Bias::Bearish => bearish += 1,
            Bias::Neutral => neutral += 1,
        }
    }

    let recent = &bars[bars.len().saturating_sub(SUPPORT_WINDOW)..];
    Summary {
        overall_trend,
        short_term,
        bullish,
        bearish,
        neutral,
        support: recent.iter().map(|b| b.low).reduce(f64::min),
        resistance: recent.iter().map(|b| b.high).reduce(f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use quotes_core::{Granularity, Symbol};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(n: usize, close: impl Fn(usize) -> f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = close(i);
                Bar::new(
                    Symbol::new("AAPL"),
                    Granularity::Day,
                    start() + TimeDelta::days(i as i64),
                    c,
                    c + 1.0,
                    c - 1.0,
                    c,
                )
                .with_volume(500.0)
            })
            .collect()
    }

    #[test]
    fn test_compute_all_groups_every_indicator() {
        let bars = series(300, |i| 100.0 + i as f64);
        let bundle = compute_all(&bars).unwrap();

        assert!(bundle.unavailable.is_empty());
        assert_eq!(bundle.outputs().count(), IndicatorName::ALL.len());
        for name in IndicatorName::ALL {
            let output = bundle.get(name).unwrap();
            assert!(bundle.groups[&name.group()].contains(output));
        }
        assert_eq!(bundle.groups[&IndicatorGroup::Trend].len(), 4);
        assert_eq!(bundle.groups[&IndicatorGroup::Volume].len(), 2);

        assert_eq!(bundle.get(IndicatorName::Rsi).unwrap().signal, Signal::Overbought);
        assert_eq!(
            bundle.get(IndicatorName::MovingAverages).unwrap().signal,
            Signal::BullishAlignment
        );

        let summary = &bundle.summary;
        assert_eq!(summary.overall_trend, Bias::Bullish);
        assert_eq!(summary.bullish + summary.bearish + summary.neutral, 10);
    }

    #[test]
    fn test_short_history_skips_demanding_indicators() {
        let bars = series(60, |i| 100.0 + i as f64);
        let bundle = compute_all(&bars).unwrap();

        // The default MA bundle needs 250 bars.
        assert_eq!(
            bundle.unavailable.keys().copied().collect::<Vec<_>>(),
            vec![IndicatorName::MovingAverages]
        );
        assert!(bundle.get(IndicatorName::MovingAverages).is_none());
        assert_eq!(bundle.outputs().count(), 9);

        assert_eq!(bundle.summary.overall_trend, Bias::Bullish);
        assert_eq!(bundle.summary.support, Some(139.0));
        assert_eq!(bundle.summary.resistance, Some(160.0));
    }

    #[test]
    fn test_falling_series_leans_bearish() {
        let bars = series(60, |i| 200.0 - i as f64);
        let bundle = compute_all(&bars).unwrap();
        assert_eq!(bundle.summary.overall_trend, Bias::Bearish);
        assert_eq!(bundle.get(IndicatorName::Adx).unwrap().signal, Signal::StrongDowntrend);
    }

    #[test]
    fn test_missing_volume_drops_volume_group() {
        let mut bars = series(60, |i| 100.0 + i as f64);
        bars[30].volume = None;
        let bundle = compute_all(&bars).unwrap();

        assert!(!bundle.groups.contains_key(&IndicatorGroup::Volume));
        assert!(bundle.unavailable.contains_key(&IndicatorName::Obv));
        assert!(bundle.unavailable.contains_key(&IndicatorName::Vwap));
        assert!(bundle.get(IndicatorName::Rsi).is_some());
    }

    #[test]
    fn test_no_bars_reports_least_demanding_indicator() {
        let err = compute_all(&[]).unwrap_err();
        assert!(matches!(
            err,
            DataError::InsufficientData {
                required: 1,
                provided: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_bundle_params_cover_every_indicator() {
        let params = bundle_params();
        assert_eq!(params.len(), IndicatorName::ALL.len());
        for (name, params) in IndicatorName::ALL.into_iter().zip(&params) {
            assert!(params.validate_for(name).is_ok());
        }
    }
}
