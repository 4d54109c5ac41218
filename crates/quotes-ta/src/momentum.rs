//! Momentum indicators.

use crate::moving::sma_defined;

/// Wilder's relative strength index.
///
/// The first average gain and loss are plain means over `period` changes; later
/// ones are smoothed as `(prev * (period - 1) + x) / period`. A zero average
/// loss yields 100.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| c.max(0.0);
    let loss = |c: f64| (-c).max(0.0);
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().copied().map(gain).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().copied().map(loss).sum::<f64>() / p;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for (i, change) in changes.iter().copied().enumerate().skip(period) {
        avg_gain = (avg_gain * (p - 1.0) + gain(change)) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss(change)) / p;
        out[i + 1] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// K, D and J lines.
#[derive(Clone, Debug, PartialEq)]
pub struct KdjSeries {
    /// Smoothed RSV.
    pub k: Vec<Option<f64>>,
    /// Smoothed K.
    pub d: Vec<Option<f64>>,
    /// `3K - 2D`.
    pub j: Vec<Option<f64>>,
}

/// Stochastic KDJ.
///
/// RSV is the close's position in the `period`-bar high/low range (50 when the
/// range is flat); K and D are simple averages over `k_smooth` and `d_smooth`.
#[must_use]
pub fn kdj(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> KdjSeries {
    let mut rsv = vec![None; close.len()];
    if period > 0 {
        for i in period.saturating_sub(1)..close.len() {
            let window = i + 1 - period..=i;
            let highest = high[window.clone()].iter().copied().fold(f64::MIN, f64::max);
            let lowest = low[window].iter().copied().fold(f64::MAX, f64::min);
            let range = highest - lowest;
            rsv[i] = Some(if range == 0.0 {
                50.0
            } else {
                (close[i] - lowest) / range * 100.0
            });
        }
    }

    let k = sma_defined(&rsv, k_smooth);
    let d = sma_defined(&k, d_smooth);
    let j = k
        .iter()
        .zip(&d)
        .map(|(k, d)| Some(3.0 * (*k)? - 2.0 * (*d)?))
        .collect();

    KdjSeries { k, d, j }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        let out = rsi(&closes, 14);
        assert!(out[13].is_none());
        assert_eq!(out[14], Some(100.0));
        assert_eq!(out[19], Some(100.0));
    }

    #[test]
    fn test_rsi_wilder_smoothing() {
        let out = rsi(&[1.0, 2.0, 1.0, 2.0, 1.0], 2);
        assert_eq!(out[..2], [None, None]);
        assert!((out[2].unwrap() - 50.0).abs() < 1e-12);
        assert!((out[3].unwrap() - 75.0).abs() < 1e-12);
        assert!((out[4].unwrap() - 37.5).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_too_short() {
        assert!(rsi(&[1.0, 2.0], 2).iter().all(Option::is_none));
    }

    #[test]
    fn test_kdj_flat_range() {
        let flat = [10.0; 6];
        let out = kdj(&flat, &flat, &flat, 3, 2, 2);
        // Defined from index period + k + d - 3.
        assert!(out.d[3].is_none());
        assert_eq!(out.k[4], Some(50.0));
        assert_eq!(out.d[4], Some(50.0));
        assert_eq!(out.j[5], Some(50.0));
    }

    #[test]
    fn test_kdj_close_at_high() {
        let high = [10.0, 11.0, 12.0, 13.0, 14.0];
        let low = [8.0, 9.0, 10.0, 11.0, 12.0];
        let out = kdj(&high, &low, &high, 2, 1, 1);
        assert_eq!(out.k[4], Some(100.0));
        assert_eq!(out.j[4], Some(100.0));
    }
}
