//! Volume indicators.

/// On-balance volume, starting at zero on the first bar.
#[must_use]
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    let mut total = 0.0;
    for (i, (close, volume)) in closes.iter().zip(volumes).enumerate() {
        if i > 0 {
            let prev = closes[i - 1];
            if *close > prev {
                total += volume;
            } else if *close < prev {
                total -= volume;
            }
        }
        out.push(total);
    }
    out
}

/// Cumulative volume-weighted average of the typical price `(high + low + close) / 3`.
///
/// While cumulative volume is zero the typical price itself is reported.
#[must_use]
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut cum_volume = 0.0;
    let mut cum_value = 0.0;
    (0..close.len())
        .map(|i| {
            let typical = (high[i] + low[i] + close[i]) / 3.0;
            cum_volume += volumes[i];
            cum_value += typical * volumes[i];
            if cum_volume == 0.0 {
                typical
            } else {
                cum_value / cum_volume
            }
        })
        .collect()
}
