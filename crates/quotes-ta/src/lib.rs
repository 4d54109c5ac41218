#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/quotes/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Indicator evaluation entry point and output type.
pub mod bundle;
pub mod engine;
/// Momentum indicators (RSI, KDJ).
pub mod momentum;
/// Rolling window primitives.
pub mod moving;
/// Indicator names and parameters.
pub mod params;
/// Signal classification and cross detection.
pub mod signal;
/// Trend indicators (EMA, MACD, moving averages, ADX).
pub mod trend;
/// Volatility indicators (Bollinger Bands, ATR).
pub mod volatility;
/// Volume indicators (OBV, VWAP).
pub mod volume;

pub use bundle::{IndicatorBundle, Summary, bundle_params, compute_all};
pub use engine::{IndicatorOutput, compute};
pub use params::{IndicatorGroup, IndicatorName, IndicatorParams, Inputs};
pub use signal::{Bias, CrossEvent, CrossKind, Signal};
