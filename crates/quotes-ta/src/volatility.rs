//! Volatility indicators.

use crate::moving::{rolling_std, sma};

/// True range per bar; the first bar uses `high - low`.
#[must_use]
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                range
            } else {
                let prev = close[i - 1];
                range.max((high[i] - prev).abs()).max((low[i] - prev).abs())
            }
        })
        .collect()
}

/// Average true range as a simple mean of the true range.
#[must_use]
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    sma(&true_range(high, low, close), period)
}

/// Bollinger Bands and bandwidth.
#[derive(Clone, Debug, PartialEq)]
pub struct BollingerSeries {
    /// Middle band plus `k` deviations.
    pub upper: Vec<Option<f64>>,
    /// Simple moving average.
    pub middle: Vec<Option<f64>>,
    /// Middle band minus `k` deviations.
    pub lower: Vec<Option<f64>>,
    /// `(upper - lower) / middle * 100`; undefined when the middle band is zero.
    pub bandwidth: Vec<Option<f64>>,
}

/// Bollinger Bands using the population standard deviation.
#[must_use]
pub fn bollinger(closes: &[f64], period: usize, std_dev: f64) -> BollingerSeries {
    let middle = sma(closes, period);
    let sigma = rolling_std(closes, period);

    let mut upper = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());
    let mut bandwidth = Vec::with_capacity(closes.len());
    for (m, s) in middle.iter().zip(&sigma) {
        match (m, s) {
            (Some(m), Some(s)) => {
                let (u, l) = (m + std_dev * s, m - std_dev * s);
                upper.push(Some(u));
                lower.push(Some(l));
                bandwidth.push((*m != 0.0).then(|| (u - l) / m * 100.0));
            }
            _ => {
                upper.push(None);
                lower.push(None);
                bandwidth.push(None);
            }
        }
    }

    BollingerSeries {
        upper,
        middle,
        lower,
        bandwidth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_range_first_bar() {
        let tr = true_range(&[12.0, 15.0], &[10.0, 13.0], &[11.0, 14.0]);
        assert_eq!(tr, vec![2.0, 4.0]);
    }

    #[test]
    fn test_atr() {
        let high = [12.0, 15.0, 14.0];
        let low = [10.0, 13.0, 12.0];
        let close = [11.0, 14.0, 13.0];
        let out = atr(&high, &low, &close, 2);
        // TR = [2, 4, 2]
        assert_eq!(out, vec![None, Some(3.0), Some(3.0)]);
    }

    #[test]
    fn test_bollinger() {
        let out = bollinger(&[1.0, 2.0, 3.0, 4.0, 5.0], 5, 2.0);
        let sigma = 2.0_f64.sqrt();
        assert_eq!(out.middle[4], Some(3.0));
        assert!((out.upper[4].unwrap() - (3.0 + 2.0 * sigma)).abs() < 1e-12);
        assert!((out.lower[4].unwrap() - (3.0 - 2.0 * sigma)).abs() < 1e-12);
        let bandwidth = out.bandwidth[4].unwrap();
        assert!((bandwidth - 4.0 * sigma / 3.0 * 100.0).abs() < 1e-9);
        assert!(out.upper[3].is_none());
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let out = bollinger(&[5.0; 4], 4, 2.0);
        assert_eq!(out.upper[3], Some(5.0));
        assert_eq!(out.lower[3], Some(5.0));
        assert_eq!(out.bandwidth[3], Some(0.0));
    }
}
