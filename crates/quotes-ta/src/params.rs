//! Indicator names and their parameters.

use quotes_core::{DataError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorName {
    /// Exponential moving average.
    Ema,
    /// Moving average convergence/divergence.
    Macd,
    /// Relative strength index.
    Rsi,
    /// Bollinger Bands.
    Bollinger,
    /// Stochastic KDJ.
    Kdj,
    /// Bundle of simple moving averages.
    MovingAverages,
    /// Average true range.
    Atr,
    /// Average directional index.
    Adx,
    /// On-balance volume.
    Obv,
    /// Volume-weighted average price.
    Vwap,
}

/// Family an indicator belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorGroup {
    /// Direction and strength of the trend.
    Trend,
    /// Oscillators.
    Momentum,
    /// Range and dispersion.
    Volatility,
    /// Volume-weighted measures.
    Volume,
}

/// Bar fields an indicator reads besides the close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Inputs {
    /// Reads high and low.
    pub high_low: bool,
    /// Reads volume.
    pub volume: bool,
}

impl IndicatorName {
    /// All indicators.
    pub const ALL: [Self; 10] = [
        Self::Ema,
        Self::Macd,
        Self::Rsi,
        Self::Bollinger,
        Self::Kdj,
        Self::MovingAverages,
        Self::Atr,
        Self::Adx,
        Self::Obv,
        Self::Vwap,
    ];

    /// Stable lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ema => "ema",
            Self::Macd => "macd",
            Self::Rsi => "rsi",
            Self::Bollinger => "bollinger",
            Self::Kdj => "kdj",
            Self::MovingAverages => "moving_averages",
            Self::Atr => "atr",
            Self::Adx => "adx",
            Self::Obv => "obv",
            Self::Vwap => "vwap",
        }
    }

    /// Bar fields consumed besides the close.
    #[must_use]
    pub const fn inputs(&self) -> Inputs {
        match self {
            Self::Ema | Self::Macd | Self::Rsi | Self::Bollinger | Self::MovingAverages => {
                Inputs {
                    high_low: false,
                    volume: false,
                }
            }
            Self::Kdj | Self::Atr | Self::Adx => Inputs {
                high_low: true,
                volume: false,
            },
            Self::Obv => Inputs {
                high_low: false,
                volume: true,
            },
            Self::Vwap => Inputs {
                high_low: true,
                volume: true,
            },
        }
    }

    /// Family this indicator belongs to.
    #[must_use]
    pub const fn group(&self) -> IndicatorGroup {
        match self {
            Self::Ema | Self::Macd | Self::MovingAverages | Self::Adx => IndicatorGroup::Trend,
            Self::Rsi | Self::Kdj => IndicatorGroup::Momentum,
            Self::Bollinger | Self::Atr => IndicatorGroup::Volatility,
            Self::Obv | Self::Vwap => IndicatorGroup::Volume,
        }
    }

    /// Conventional default parameters.
    #[must_use]
    pub fn default_params(&self) -> IndicatorParams {
        match self {
            Self::Ema => IndicatorParams::Ema { period: 20 },
            Self::Macd => IndicatorParams::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            Self::Rsi => IndicatorParams::Rsi {
                period: 14,
                overbought: 70.0,
                oversold: 30.0,
            },
            Self::Bollinger => IndicatorParams::Bollinger {
                period: 20,
                std_dev: 2.0,
            },
            Self::Kdj => IndicatorParams::Kdj {
                period: 9,
                k_smooth: 3,
                d_smooth: 3,
            },
            Self::MovingAverages => IndicatorParams::MovingAverages {
                periods: vec![5, 10, 20, 30, 60, 120, 250],
            },
            Self::Atr => IndicatorParams::Atr { period: 14 },
            Self::Adx => IndicatorParams::Adx { period: 14 },
            Self::Obv => IndicatorParams::Obv,
            Self::Vwap => IndicatorParams::Vwap,
        }
    }
}

impl fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorName {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == lower)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown indicator: {s}")))
    }
}

/// Parameters of one indicator evaluation.
///
/// The serialized form is canonical: field order is fixed, so equal parameters
/// always serialize to identical JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "indicator", rename_all = "snake_case")]
pub enum IndicatorParams {
    /// EMA over `period` closes.
    Ema {
        /// Smoothing period.
        period: usize,
    },
    /// MACD with fast/slow EMAs and a signal EMA.
    Macd {
        /// Fast EMA period.
        fast: usize,
        /// Slow EMA period.
        slow: usize,
        /// Signal EMA period.
        signal: usize,
    },
    /// RSI with classification thresholds.
    Rsi {
        /// Smoothing period.
        period: usize,
        /// Overbought threshold.
        overbought: f64,
        /// Oversold threshold.
        oversold: f64,
    },
    /// Bollinger Bands.
    Bollinger {
        /// Window length.
        period: usize,
        /// Band width in standard deviations.
        std_dev: f64,
    },
    /// KDJ stochastic.
    Kdj {
        /// High/low lookback.
        period: usize,
        /// K smoothing window.
        k_smooth: usize,
        /// D smoothing window.
        d_smooth: usize,
    },
    /// Simple moving averages for several periods.
    MovingAverages {
        /// Periods, shortest first.
        periods: Vec<usize>,
    },
    /// ATR.
    Atr {
        /// Averaging window.
        period: usize,
    },
    /// ADX with directional indicators.
    Adx {
        /// Averaging window.
        period: usize,
    },
    /// OBV.
    Obv,
    /// VWAP.
    Vwap,
}

impl IndicatorParams {
    /// Indicator these parameters belong to.
    #[must_use]
    pub const fn name(&self) -> IndicatorName {
        match self {
            Self::Ema { .. } => IndicatorName::Ema,
            Self::Macd { .. } => IndicatorName::Macd,
            Self::Rsi { .. } => IndicatorName::Rsi,
            Self::Bollinger { .. } => IndicatorName::Bollinger,
            Self::Kdj { .. } => IndicatorName::Kdj,
            Self::MovingAverages { .. } => IndicatorName::MovingAverages,
            Self::Atr { .. } => IndicatorName::Atr,
            Self::Adx { .. } => IndicatorName::Adx,
            Self::Obv => IndicatorName::Obv,
            Self::Vwap => IndicatorName::Vwap,
        }
    }

    /// Check the parameters for `name`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for a zero period, inconsistent
    /// thresholds, or parameters that belong to another indicator.
    pub fn validate_for(&self, name: IndicatorName) -> Result<()> {
        if self.name() != name {
            return Err(DataError::InvalidParameter(format!(
                "{} parameters supplied for {name}",
                self.name()
            )));
        }

        let positive = |label: &str, value: usize| {
            if value == 0 {
                Err(DataError::InvalidParameter(format!(
                    "{name} {label} must be positive"
                )))
            } else {
                Ok(())
            }
        };

        match self {
            Self::Ema { period } | Self::Atr { period } | Self::Adx { period } => {
                positive("period", *period)
            }
            Self::Macd { fast, slow, signal } => {
                positive("fast", *fast)?;
                positive("slow", *slow)?;
                positive("signal", *signal)?;
                if fast >= slow {
                    return Err(DataError::InvalidParameter(format!(
                        "macd fast period {fast} must be shorter than slow period {slow}"
                    )));
                }
                Ok(())
            }
            Self::Rsi {
                period,
                overbought,
                oversold,
            } => {
                positive("period", *period)?;
                if !(0.0 < *oversold && oversold < overbought && *overbought < 100.0) {
                    return Err(DataError::InvalidParameter(format!(
                        "rsi thresholds must satisfy 0 < oversold ({oversold}) < overbought ({overbought}) < 100"
                    )));
                }
                Ok(())
            }
            Self::Bollinger { period, std_dev } => {
                positive("period", *period)?;
                if !(std_dev.is_finite() && *std_dev > 0.0) {
                    return Err(DataError::InvalidParameter(format!(
                        "bollinger std_dev must be positive, got {std_dev}"
                    )));
                }
                Ok(())
            }
            Self::Kdj {
                period,
                k_smooth,
                d_smooth,
            } => {
                positive("period", *period)?;
                positive("k_smooth", *k_smooth)?;
                positive("d_smooth", *d_smooth)
            }
            Self::MovingAverages { periods } => {
                if periods.is_empty() {
                    return Err(DataError::InvalidParameter(
                        "moving_averages needs at least one period".to_string(),
                    ));
                }
                periods.iter().try_for_each(|p| positive("period", *p))
            }
            Self::Obv | Self::Vwap => Ok(()),
        }
    }

    /// Minimum number of bars needed to produce a current value.
    #[must_use]
    pub fn min_required(&self) -> usize {
        match self {
            Self::Ema { period } | Self::Atr { period } => *period,
            Self::Macd { slow, signal, .. } => slow + signal,
            Self::Rsi { period, .. } => period + 1,
            Self::Bollinger { period, .. } => *period,
            Self::Kdj {
                period,
                k_smooth,
                d_smooth,
            } => (period + k_smooth + d_smooth).saturating_sub(2),
            Self::MovingAverages { periods } => periods.iter().copied().max().unwrap_or(0),
            Self::Adx { period } => 2 * period,
            Self::Obv => 2,
            Self::Vwap => 1,
        }
    }

    /// Canonical JSON form.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if serialization fails.
    pub fn canonical_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DataError::Parse(e.to_string()))
    }
}
