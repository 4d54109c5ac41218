//! Qualitative signals and MACD cross detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative reading of an indicator's latest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// MACD histogram turned positive on the last bar.
    GoldenCross,
    /// MACD histogram turned negative on the last bar.
    DeathCross,
    /// Momentum or price position favours the upside.
    Bullish,
    /// Momentum or price position favours the downside.
    Bearish,
    /// Oscillator at or above its upper threshold.
    Overbought,
    /// Oscillator at or below its lower threshold.
    Oversold,
    /// Shorter averages strictly above longer ones.
    BullishAlignment,
    /// Shorter averages strictly below longer ones.
    BearishAlignment,
    /// Averages neither fully bullish nor fully bearish.
    Mixed,
    /// Strong trend with +DI leading.
    StrongUptrend,
    /// Strong trend with -DI leading.
    StrongDowntrend,
    /// Trend strength below threshold.
    NoTrend,
    /// Current volatility above its recent average.
    VolatilityExpanding,
    /// Current volatility at or below its recent average.
    VolatilityContracting,
    /// Series higher than it was a few bars ago.
    Rising,
    /// Series not higher than it was a few bars ago.
    Falling,
    /// Not enough history to classify.
    Neutral,
}

impl Signal {
    /// Stable lower-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoldenCross => "golden_cross",
            Self::DeathCross => "death_cross",
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Overbought => "overbought",
            Self::Oversold => "oversold",
            Self::BullishAlignment => "bullish_alignment",
            Self::BearishAlignment => "bearish_alignment",
            Self::Mixed => "mixed",
            Self::StrongUptrend => "strong_uptrend",
            Self::StrongDowntrend => "strong_downtrend",
            Self::NoTrend => "no_trend",
            Self::VolatilityExpanding => "volatility_expanding",
            Self::VolatilityContracting => "volatility_contracting",
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Neutral => "neutral",
        }
    }
}

/// Direction a signal leans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    /// Favours the upside.
    Bullish,
    /// Favours the downside.
    Bearish,
    /// No direction.
    Neutral,
}

impl Signal {
    /// Direction of this signal. Overbought readings lean bearish and
    /// oversold ones bullish; volatility readings have no direction.
    #[must_use]
    pub const fn bias(&self) -> Bias {
        match self {
            Self::GoldenCross
            | Self::Bullish
            | Self::Oversold
            | Self::BullishAlignment
            | Self::StrongUptrend
            | Self::Rising => Bias::Bullish,
            Self::DeathCross
            | Self::Bearish
            | Self::Overbought
            | Self::BearishAlignment
            | Self::StrongDowntrend
            | Self::Falling => Bias::Bearish,
            Self::Mixed
            | Self::NoTrend
            | Self::VolatilityExpanding
            | Self::VolatilityContracting
            | Self::Neutral => Bias::Neutral,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a MACD histogram sign change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossKind {
    /// Histogram went from `<= 0` to `> 0`.
    Golden,
    /// Histogram went from `>= 0` to `< 0`.
    Death,
}

/// A histogram sign change at a bar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossEvent {
    /// Index of the bar where the new sign first appears.
    pub index: usize,
    /// That bar's period start.
    pub time_key: DateTime<Utc>,
    /// Cross direction.
    pub kind: CrossKind,
}

/// Indices and directions of every sign change in a histogram.
///
/// Undefined positions break the sequence; a cross needs both neighbours defined.
#[must_use]
pub fn crosses(histogram: &[Option<f64>]) -> Vec<(usize, CrossKind)> {
    histogram
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let (prev, curr) = (pair[0]?, pair[1]?);
            if prev <= 0.0 && curr > 0.0 {
                Some((i + 1, CrossKind::Golden))
            } else if prev >= 0.0 && curr < 0.0 {
                Some((i + 1, CrossKind::Death))
            } else {
                None
            }
        })
        .collect()
}

/// MACD: a cross on the last bar wins, otherwise the histogram sign.
#[must_use]
pub fn classify_macd(histogram: &[Option<f64>]) -> Signal {
    let last = histogram.len().saturating_sub(1);
    match crosses(histogram).last() {
        Some((i, CrossKind::Golden)) if *i == last => Signal::GoldenCross,
        Some((i, CrossKind::Death)) if *i == last => Signal::DeathCross,
        _ => match histogram.last().copied().flatten() {
            Some(h) if h > 0.0 => Signal::Bullish,
            Some(_) => Signal::Bearish,
            None => Signal::Neutral,
        },
    }
}

/// RSI against its thresholds, then the 50 midline.
#[must_use]
pub fn classify_rsi(rsi: f64, overbought: f64, oversold: f64) -> Signal {
    if rsi >= overbought {
        Signal::Overbought
    } else if rsi <= oversold {
        Signal::Oversold
    } else if rsi > 50.0 {
        Signal::Bullish
    } else {
        Signal::Bearish
    }
}

/// KDJ: both lines above 80 or below 20, otherwise K relative to D.
#[must_use]
pub fn classify_kdj(k: f64, d: f64) -> Signal {
    if k > 80.0 && d > 80.0 {
        Signal::Overbought
    } else if k < 20.0 && d < 20.0 {
        Signal::Oversold
    } else if k > d {
        Signal::Bullish
    } else {
        Signal::Bearish
    }
}

/// Close position within the Bollinger Bands.
#[must_use]
pub fn classify_bollinger(close: f64, upper: f64, middle: f64, lower: f64) -> Signal {
    if close >= upper {
        Signal::Overbought
    } else if close <= lower {
        Signal::Oversold
    } else if close > middle {
        Signal::Bullish
    } else {
        Signal::Bearish
    }
}

/// Ordering of moving averages given shortest period first.
#[must_use]
pub fn classify_alignment(averages: &[f64]) -> Signal {
    if averages.len() < 2 {
        return Signal::Mixed;
    }
    if averages.windows(2).all(|w| w[0] > w[1]) {
        Signal::BullishAlignment
    } else if averages.windows(2).all(|w| w[0] < w[1]) {
        Signal::BearishAlignment
    } else {
        Signal::Mixed
    }
}

/// Trend strength threshold for ADX.
pub const ADX_STRONG_TREND: f64 = 25.0;

/// ADX above the threshold is a strong trend in the direction of the leading DI.
#[must_use]
pub fn classify_adx(adx: f64, plus_di: f64, minus_di: f64) -> Signal {
    if adx > ADX_STRONG_TREND {
        if plus_di > minus_di {
            Signal::StrongUptrend
        } else {
            Signal::StrongDowntrend
        }
    } else {
        Signal::NoTrend
    }
}

/// Latest value against the value four bars earlier.
#[must_use]
pub fn classify_momentum(series: &[f64]) -> Signal {
    match series {
        [.., fifth_last, _, _, _, last] => {
            if last > fifth_last {
                Signal::Rising
            } else {
                Signal::Falling
            }
        }
        _ => Signal::Neutral,
    }
}

/// Close above the reference line is bullish.
#[must_use]
pub fn classify_position(close: f64, reference: f64) -> Signal {
    if close > reference {
        Signal::Bullish
    } else {
        Signal::Bearish
    }
}

/// Current volatility against its recent average.
#[must_use]
pub fn classify_volatility(current: f64, average: f64) -> Signal {
    if current > average {
        Signal::VolatilityExpanding
    } else {
        Signal::VolatilityContracting
    }
}
