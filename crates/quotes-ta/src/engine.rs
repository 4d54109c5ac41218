//! Indicator evaluation.

use quotes_core::{Bar, DataError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use crate::params::{IndicatorName, IndicatorParams};
use crate::signal::{self, CrossEvent, Signal};
use crate::{momentum, trend, volatility, volume};

/// Window over which the ATR average is taken.
const ATR_AVERAGE_WINDOW: usize = 20;

/// Result of one indicator evaluation.
///
/// Every series has one entry per input bar. `current` holds each series' value
/// at the last bar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorOutput {
    /// Indicator evaluated.
    pub name: IndicatorName,
    /// Parameters used.
    pub params: IndicatorParams,
    /// Named output series.
    pub series: BTreeMap<String, Vec<Option<f64>>>,
    /// Value of each series at the last bar.
    pub current: BTreeMap<String, Option<f64>>,
    /// Classification of the latest values.
    pub signal: Signal,
    /// MACD histogram sign changes; empty for other indicators.
    pub crosses: Vec<CrossEvent>,
    /// Indicator-specific scalars.
    pub extras: BTreeMap<String, f64>,
}

impl IndicatorOutput {
    fn new(name: IndicatorName, params: &IndicatorParams) -> Self {
        Self {
            name,
            params: params.clone(),
            series: BTreeMap::new(),
            current: BTreeMap::new(),
            signal: Signal::Neutral,
            crosses: Vec::new(),
            extras: BTreeMap::new(),
        }
    }

    /// Adds a series and records its last value. Returns that value.
    fn push(&mut self, key: impl Into<String>, values: Vec<Option<f64>>) -> Option<f64> {
        let key = key.into();
        let last = values.last().copied().flatten();
        self.current.insert(key.clone(), last);
        self.series.insert(key, values);
        last
    }

    /// Value of a series at the last bar.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<f64> {
        self.current.get(key).copied().flatten()
    }
}

fn defined(values: Vec<f64>) -> Vec<Option<f64>> {
    values.into_iter().map(Some).collect()
}

/// Evaluate `name` with `params` over `bars` (ascending by time).
///
/// # Errors
/// Returns [`DataError::InvalidParameter`] if the parameters are invalid or
/// belong to another indicator, and [`DataError::InsufficientData`] if there
/// are fewer bars than the indicator needs or a volume indicator meets a bar
/// without volume.
pub fn compute(
    name: IndicatorName,
    bars: &[Bar],
    params: &IndicatorParams,
) -> Result<IndicatorOutput> {
    params.validate_for(name)?;

    let required = params.min_required();
    let insufficient = |provided: usize| DataError::InsufficientData {
        indicator: name.to_string(),
        required,
        provided,
    };
    if bars.len() < required {
        return Err(insufficient(bars.len()));
    }

    let volumes: Vec<f64> = if name.inputs().volume {
        bars.iter()
            .map(|b| b.volume)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| insufficient(bars.iter().filter(|b| b.volume.is_some()).count()))?
    } else {
        Vec::new()
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let last_close = closes.last().copied().unwrap_or_default();

    let mut out = IndicatorOutput::new(name, params);
    out.signal = match params {
        IndicatorParams::Ema { period } => {
            match out.push("ema", crate::moving::ema(&closes, *period)) {
                Some(ema) => signal::classify_position(last_close, ema),
                None => Signal::Neutral,
            }
        }
        IndicatorParams::Macd {
            fast,
            slow,
            signal: signal_period,
        } => {
            let series = trend::macd(&closes, *fast, *slow, *signal_period);
            out.crosses = signal::crosses(&series.histogram)
                .into_iter()
                .map(|(index, kind)| CrossEvent {
                    index,
                    time_key: bars[index].time_key,
                    kind,
                })
                .collect();
            let classified = signal::classify_macd(&series.histogram);
            out.push("macd", series.macd);
            out.push("signal", series.signal);
            out.push("histogram", series.histogram);
            classified
        }
        IndicatorParams::Rsi {
            period,
            overbought,
            oversold,
        } => match out.push("rsi", momentum::rsi(&closes, *period)) {
            Some(rsi) => signal::classify_rsi(rsi, *overbought, *oversold),
            None => Signal::Neutral,
        },
        IndicatorParams::Bollinger { period, std_dev } => {
            let bands = volatility::bollinger(&closes, *period, *std_dev);
            let upper = out.push("upper", bands.upper);
            let middle = out.push("middle", bands.middle);
            let lower = out.push("lower", bands.lower);
            out.push("bandwidth", bands.bandwidth);
            match (upper, middle, lower) {
                (Some(u), Some(m), Some(l)) => signal::classify_bollinger(last_close, u, m, l),
                _ => Signal::Neutral,
            }
        }
        IndicatorParams::Kdj {
            period,
            k_smooth,
            d_smooth,
        } => {
            let lines = momentum::kdj(&highs, &lows, &closes, *period, *k_smooth, *d_smooth);
            let k = out.push("k", lines.k);
            let d = out.push("d", lines.d);
            out.push("j", lines.j);
            match (k, d) {
                (Some(k), Some(d)) => signal::classify_kdj(k, d),
                _ => Signal::Neutral,
            }
        }
        IndicatorParams::MovingAverages { periods } => {
            let mut latest: BTreeMap<usize, Option<f64>> = BTreeMap::new();
            for (period, values) in trend::moving_averages(&closes, periods) {
                let last = out.push(format!("ma_{period}"), values);
                latest.insert(period, last);
            }
            // Shortest period first.
            match latest.into_values().collect::<Option<Vec<f64>>>() {
                Some(averages) => signal::classify_alignment(&averages),
                None => Signal::Neutral,
            }
        }
        IndicatorParams::Atr { period } => {
            let values = volatility::atr(&highs, &lows, &closes, *period);
            let recent: Vec<f64> = values
                .iter()
                .rev()
                .take(ATR_AVERAGE_WINDOW)
                .filter_map(|v| *v)
                .collect();
            let current = out.push("atr", values);
            match current {
                Some(current) if !recent.is_empty() => {
                    let average = recent.iter().sum::<f64>() / recent.len() as f64;
                    out.extras.insert("average".to_string(), average);
                    signal::classify_volatility(current, average)
                }
                _ => Signal::Neutral,
            }
        }
        IndicatorParams::Adx { period } => {
            let lines = trend::adx(&highs, &lows, &closes, *period);
            let adx = out.push("adx", lines.adx);
            let plus = out.push("plus_di", lines.plus_di);
            let minus = out.push("minus_di", lines.minus_di);
            match (adx, plus, minus) {
                (Some(a), Some(p), Some(m)) => signal::classify_adx(a, p, m),
                _ => Signal::Neutral,
            }
        }
        IndicatorParams::Obv => {
            let values = volume::obv(&closes, &volumes);
            let classified = signal::classify_momentum(&values);
            out.push("obv", defined(values));
            classified
        }
        IndicatorParams::Vwap => {
            let values = volume::vwap(&highs, &lows, &closes, &volumes);
            match out.push("vwap", defined(values)) {
                Some(vwap) => signal::classify_position(last_close, vwap),
                None => Signal::Neutral,
            }
        }
    };

    trace!(indicator = %name, bars = bars.len(), signal = %out.signal, "Computed indicator");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use quotes_core::{Granularity, Symbol};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    Symbol::new("AAPL"),
                    Granularity::Day,
                    start() + TimeDelta::days(i as i64),
                    c,
                    c + 1.0,
                    c - 1.0,
                    c,
                )
                .with_volume(1_000.0 + i as f64)
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        series(&closes)
    }

    #[test]
    fn test_every_indicator_on_long_series() {
        let bars = rising(300);
        for name in IndicatorName::ALL {
            let out = compute(name, &bars, &name.default_params()).unwrap();
            assert_eq!(out.name, name);
            for values in out.series.values() {
                assert_eq!(values.len(), bars.len());
            }
            assert!(out.current.values().all(Option::is_some), "{name}");
        }
    }

    #[test]
    fn test_insufficient_data() {
        let bars = rising(10);
        let err = compute(
            IndicatorName::Macd,
            &bars,
            &IndicatorName::Macd.default_params(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DataError::InsufficientData {
                indicator: "macd".to_string(),
                required: 35,
                provided: 10,
            }
        );
    }

    #[test]
    fn test_params_checked_before_length() {
        let err = compute(IndicatorName::Rsi, &[], &IndicatorParams::Atr { period: 14 }).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
    }

    #[test]
    fn test_volume_indicator_needs_volume_on_every_bar() {
        let mut bars = rising(10);
        bars[4].volume = None;
        let err = compute(IndicatorName::Obv, &bars, &IndicatorParams::Obv).unwrap_err();
        assert!(matches!(
            err,
            DataError::InsufficientData {
                required: 2,
                provided: 9,
                ..
            }
        ));

        // Price-only indicators ignore missing volume.
        assert!(compute(IndicatorName::Ema, &bars, &IndicatorParams::Ema { period: 5 }).is_ok());
    }

    #[test]
    fn test_deterministic_output() {
        let bars = rising(60);
        let params = IndicatorName::Bollinger.default_params();
        let a = compute(IndicatorName::Bollinger, &bars, &params).unwrap();
        let b = compute(IndicatorName::Bollinger, &bars, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rising_series_classifications() {
        let bars = rising(40);

        let rsi = compute(IndicatorName::Rsi, &bars, &IndicatorName::Rsi.default_params()).unwrap();
        assert_eq!(rsi.current("rsi"), Some(100.0));
        assert_eq!(rsi.signal, Signal::Overbought);

        let ma = compute(
            IndicatorName::MovingAverages,
            &bars,
            &IndicatorParams::MovingAverages {
                periods: vec![20, 5, 10],
            },
        )
        .unwrap();
        assert_eq!(ma.signal, Signal::BullishAlignment);
        assert!(ma.series.contains_key("ma_20"));

        let obv = compute(IndicatorName::Obv, &bars, &IndicatorParams::Obv).unwrap();
        assert_eq!(obv.signal, Signal::Rising);
    }

    #[test]
    fn test_falling_series_alignment() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let out = compute(
            IndicatorName::MovingAverages,
            &series(&closes),
            &IndicatorParams::MovingAverages {
                periods: vec![5, 10, 20],
            },
        )
        .unwrap();
        assert_eq!(out.signal, Signal::BearishAlignment);
    }

    #[test]
    fn test_macd_cross_events_carry_time_keys() {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - 0.05 * f64::from(i * i)).collect();
        closes.extend((1..=20).map(|i| 124.0 + 5.0 * f64::from(i)));
        let bars = series(&closes);

        let out = compute(IndicatorName::Macd, &bars, &IndicatorName::Macd.default_params()).unwrap();
        assert!(
            out.crosses
                .iter()
                .any(|c| c.kind == signal::CrossKind::Golden && c.index >= 40)
        );
        for cross in &out.crosses {
            assert_eq!(cross.time_key, bars[cross.index].time_key);
        }
    }

    #[test]
    fn test_atr_average_extra() {
        let out = compute(IndicatorName::Atr, &rising(30), &IndicatorParams::Atr { period: 5 }).unwrap();
        // Constant true range of 2 after the first bar.
        assert_eq!(out.current("atr"), Some(2.0));
        assert_eq!(out.extras.get("average"), Some(&2.0));
        assert_eq!(out.signal, Signal::VolatilityContracting);
    }

    #[test]
    fn test_output_survives_json() {
        let bars = rising(40);
        let out = compute(IndicatorName::Kdj, &bars, &IndicatorName::Kdj.default_params()).unwrap();
        let json = serde_json::to_vec(&out).unwrap();
        let back: IndicatorOutput = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.signal, out.signal);
        assert_eq!(back.current, out.current);
    }
}
