//! Rolling means, exponential smoothing and dispersion.
//!
//! All functions return one entry per input value; entries before the window is
//! full are `None`.

/// Simple moving average.
#[must_use]
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Simple moving average over a partially defined series.
///
/// A position is defined only when every value in its window is defined.
#[must_use]
pub fn sma_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        let sum: Option<f64> = window.iter().copied().sum();
        out[i + period - 1] = sum.map(|s| s / period as f64);
    }
    out
}

/// Exponential moving average seeded with the mean of the first `period` values,
/// then smoothed with `k = 2 / (period + 1)`.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for (i, value) in values.iter().enumerate().skip(period) {
        prev = value * k + prev * (1.0 - k);
        out[i] = Some(prev);
    }
    out
}

/// Exponential moving average over the defined run of a series that starts
/// with undefined entries.
#[must_use]
pub fn ema_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    let run: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
    for (offset, value) in ema(&run, period).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}

/// Rolling population standard deviation.
#[must_use]
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i + period - 1] = Some(variance.sqrt());
    }
    out
}

/// Last defined value of a series.
#[must_use]
pub fn last_defined(values: &[Option<f64>]) -> Option<f64> {
    values.iter().rev().find_map(|v| *v)
}
