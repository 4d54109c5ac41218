//! Core market data types.
//!
//! This module defines the records that flow through the cache:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`Market`] - Exchange market a symbol is listed on
//! - [`Bar`] - OHLCV price bar
//! - [`Quote`] - Real-time quote snapshot
//! - [`Instrument`] - Instrument reference information

use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::{Column, DataFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, Result};
use crate::granularity::Granularity;

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation, so `"hk.00700"` and
/// `"HK.00700"` address the same cache entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Exchange market.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Hong Kong.
    Hk,
    /// United States.
    Us,
    /// Shanghai.
    Sh,
    /// Shenzhen.
    Sz,
}

impl Market {
    /// Stable code used in cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hk => "HK",
            Self::Us => "US",
            Self::Sh => "SH",
            Self::Sz => "SZ",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLCV bar for one period of a series.
///
/// A bar is identified by `(symbol, granularity, time_key)`. Bars whose period
/// has closed never change; the bar of the current period may still be revised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol the bar belongs to.
    pub symbol: Symbol,
    /// Period length.
    pub granularity: Granularity,
    /// Start of the bar period.
    pub time_key: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing (or latest) price.
    pub close: f64,
    /// Traded volume, when the provider reports it.
    pub volume: Option<f64>,
    /// Traded value, when the provider reports it.
    pub turnover: Option<f64>,
}

impl Bar {
    /// Creates a new bar without volume or turnover.
    #[must_use]
    pub const fn new(
        symbol: Symbol,
        granularity: Granularity,
        time_key: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Self {
        Self {
            symbol,
            granularity,
            time_key,
            open,
            high,
            low,
            close,
            volume: None,
            turnover: None,
        }
    }

    /// Sets the traded volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the traded value.
    #[must_use]
    pub const fn with_turnover(mut self, turnover: f64) -> Self {
        self.turnover = Some(turnover);
        self
    }

    /// Returns true while the bar's period has not yet closed at `now`.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.time_key + self.granularity.period() > now
    }
}

/// Converts a bar series into a DataFrame.
///
/// Columns: `symbol`, `time_key` (milliseconds since the Unix epoch), `open`, `high`,
/// `low`, `close`, `volume`, `turnover`.
///
/// # Errors
/// Returns [`DataError::Other`] if the frame cannot be assembled.
pub fn bars_to_frame(bars: &[Bar]) -> Result<DataFrame> {
    let symbols: Vec<&str> = bars.iter().map(|b| b.symbol.as_str()).collect();
    let time_keys: Vec<i64> = bars.iter().map(|b| b.time_key.timestamp_millis()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<Option<f64>> = bars.iter().map(|b| b.volume).collect();
    let turnovers: Vec<Option<f64>> = bars.iter().map(|b| b.turnover).collect();

    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        Column::new("time_key".into(), time_keys),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
    ])
    .map_err(|e| DataError::Other(e.to_string()))
}

/// Real-time quote snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub last_price: f64,
    /// Session open.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Previous session close.
    pub prev_close: f64,
    /// Session volume.
    pub volume: f64,
    /// Session turnover.
    pub turnover: f64,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Price change relative to the previous close, in percent.
    #[must_use]
    pub fn change_pct(&self) -> Option<f64> {
        if self.prev_close == 0.0 {
            return None;
        }
        Some((self.last_price - self.prev_close) / self.prev_close * 100.0)
    }
}

/// Instrument reference information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Display name.
    pub name: String,
    /// Listing market.
    pub market: Market,
    /// Board lot size.
    pub lot_size: u32,
    /// Instrument type (e.g. "STOCK", "ETF").
    pub instrument_type: String,
    /// Listing date, if known.
    pub listing_date: Option<NaiveDate>,
}

impl Instrument {
    /// Creates new instrument info with required fields.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        market: Market,
        lot_size: u32,
        instrument_type: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            name: name.into(),
            market,
            lot_size,
            instrument_type: instrument_type.into(),
            listing_date: None,
        }
    }

    /// Sets the listing date.
    #[must_use]
    pub const fn with_listing_date(mut self, date: NaiveDate) -> Self {
        self.listing_date = Some(date);
        self
    }
}
