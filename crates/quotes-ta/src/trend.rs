//! Trend indicators.

use crate::moving::{ema, ema_defined, sma, sma_defined};
use crate::volatility::true_range;

/// MACD line, signal line and histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct MacdSeries {
    /// Fast EMA minus slow EMA.
    pub macd: Vec<Option<f64>>,
    /// EMA of the MACD line.
    pub signal: Vec<Option<f64>>,
    /// MACD minus signal.
    pub histogram: Vec<Option<f64>>,
}

/// Moving average convergence/divergence.
#[must_use]
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_defined(&macd, signal);
    let histogram = macd
        .iter()
        .zip(&signal)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}

/// Simple moving averages for each period, in the order given.
#[must_use]
pub fn moving_averages(closes: &[f64], periods: &[usize]) -> Vec<(usize, Vec<Option<f64>>)> {
    periods.iter().map(|&p| (p, sma(closes, p))).collect()
}

/// ADX with its directional indicators.
#[derive(Clone, Debug, PartialEq)]
pub struct AdxSeries {
    /// Average directional index.
    pub adx: Vec<Option<f64>>,
    /// Positive directional indicator.
    pub plus_di: Vec<Option<f64>>,
    /// Negative directional indicator.
    pub minus_di: Vec<Option<f64>>,
}

/// Average directional index.
///
/// +DM and -DM are the positive parts of the high and low moves, averaged
/// with the true range over `period` bars. DI values are zero when the average
/// true range is zero, DX is zero when both DIs are.
#[must_use]
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> AdxSeries {
    let n = close.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        plus_dm[i] = (high[i] - high[i - 1]).max(0.0);
        minus_dm[i] = (low[i - 1] - low[i]).max(0.0);
    }

    let tr_mean = sma(&true_range(high, low, close), period);
    let plus_mean = sma(&plus_dm, period);
    let minus_mean = sma(&minus_dm, period);

    let directional = |dm: &[Option<f64>]| -> Vec<Option<f64>> {
        dm.iter()
            .zip(&tr_mean)
            .map(|(dm, tr)| {
                let (dm, tr) = ((*dm)?, (*tr)?);
                Some(if tr == 0.0 { 0.0 } else { 100.0 * dm / tr })
            })
            .collect()
    };
    let plus_di = directional(&plus_mean);
    let minus_di = directional(&minus_mean);

    let dx: Vec<Option<f64>> = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| {
            let (p, m) = ((*p)?, (*m)?);
            let sum = p + m;
            Some(if sum == 0.0 { 0.0 } else { 100.0 * (p - m).abs() / sum })
        })
        .collect();

    AdxSeries {
        adx: sma_defined(&dx, period),
        plus_di,
        minus_di,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_alignment() {
        let closes: Vec<f64> = (1..=40).map(f64::from).collect();
        let out = macd(&closes, 3, 6, 4);

        // MACD defined once the slow EMA is, signal `signal - 1` bars later.
        assert!(out.macd[4].is_none());
        assert!(out.macd[5].is_some());
        assert!(out.signal[7].is_none());
        assert!(out.signal[8].is_some());
        assert!(out.histogram[8].is_some());
        assert_eq!(out.histogram.len(), closes.len());
    }

    #[test]
    fn test_macd_of_linear_series_is_constant() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let out = macd(&closes, 12, 26, 9);
        // EMA of a line lags by (n - 1) / 2, so fast - slow converges to 7.
        let last = out.macd[59].unwrap();
        assert!((last - 7.0).abs() < 1e-6, "macd {last}");
        assert!(out.histogram[59].unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_moving_averages_keep_period_order() {
        let closes = [1.0, 2.0, 3.0, 4.0];
        let out = moving_averages(&closes, &[2, 4]);
        assert_eq!(out[0].0, 2);
        assert_eq!(out[0].1[3], Some(3.5));
        assert_eq!(out[1].1[3], Some(2.5));
    }

    #[test]
    fn test_adx_uptrend() {
        let high: Vec<f64> = (0..30).map(|i| 11.0 + f64::from(i)).collect();
        let low: Vec<f64> = (0..30).map(|i| 9.0 + f64::from(i)).collect();
        let close: Vec<f64> = (0..30).map(|i| 10.0 + f64::from(i)).collect();

        let out = adx(&high, &low, &close, 5);
        assert!(out.adx[7].is_none());
        assert!(out.adx[8].is_some());

        let last = out.adx[29].unwrap();
        assert!(last > 25.0);
        assert!(out.plus_di[29].unwrap() > out.minus_di[29].unwrap());
        assert_eq!(out.minus_di[29], Some(0.0));
    }
}
