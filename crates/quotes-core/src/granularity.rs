//! Bar granularity definitions.
//!
//! This module defines [`Granularity`] for specifying the period length of a bar
//! series, together with the stable string codes used in cache keys and the
//! durable store.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// Period length of a bar series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// One-minute bars.
    Min1,
    /// Five-minute bars.
    Min5,
    /// Fifteen-minute bars.
    Min15,
    /// Thirty-minute bars.
    Min30,
    /// Hourly bars.
    Min60,
    /// Daily bars.
    Day,
    /// Weekly bars.
    Week,
    /// Monthly bars.
    Month,
}

impl Granularity {
    /// All granularities, shortest first.
    pub const ALL: [Self; 8] = [
        Self::Min1,
        Self::Min5,
        Self::Min15,
        Self::Min30,
        Self::Min60,
        Self::Day,
        Self::Week,
        Self::Month,
    ];

    /// Returns true if this is an intraday granularity.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(
            self,
            Self::Min1 | Self::Min5 | Self::Min15 | Self::Min30 | Self::Min60
        )
    }

    /// Nominal length of one bar period.
    ///
    /// Months are treated as 31 days so that a bar is never considered closed
    /// before its calendar period has actually ended.
    #[must_use]
    pub fn period(&self) -> TimeDelta {
        match self {
            Self::Min1 => TimeDelta::minutes(1),
            Self::Min5 => TimeDelta::minutes(5),
            Self::Min15 => TimeDelta::minutes(15),
            Self::Min30 => TimeDelta::minutes(30),
            Self::Min60 => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::days(7),
            Self::Month => TimeDelta::days(31),
        }
    }

    /// Stable code used in cache keys and persisted rows.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "K_1M",
            Self::Min5 => "K_5M",
            Self::Min15 => "K_15M",
            Self::Min30 => "K_30M",
            Self::Min60 => "K_60M",
            Self::Day => "K_DAY",
            Self::Week => "K_WEEK",
            Self::Month => "K_MON",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown granularity: {s}")))
    }
}
