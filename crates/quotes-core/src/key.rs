//! Cache key construction and TTL policy.
//!
//! Every cached value is addressed by a [`CacheKey`] built from its [`DataKind`],
//! an optional symbol scope, an optional [`Granularity`] and a set of named
//! parameters. Parameters are kept sorted, so the same logical request always
//! produces the same key regardless of the order the caller supplied them in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DataError;
use crate::granularity::Granularity;
use crate::types::{Market, Symbol};

/// Kind of data stored under a key.
///
/// The set is closed: each kind carries a static [`TtlPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Real-time quote snapshots.
    Quote,
    /// Historical bar windows.
    Bars,
    /// Instrument reference data.
    BasicInfo,
    /// Computed indicator results.
    Indicator,
}

impl DataKind {
    /// All data kinds.
    pub const ALL: [Self; 4] = [Self::Quote, Self::Bars, Self::BasicInfo, Self::Indicator];

    /// Stable prefix used in key text.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Bars => "bars",
            Self::BasicInfo => "basic_info",
            Self::Indicator => "indicator",
        }
    }

    /// TTL policy for this kind.
    #[must_use]
    pub const fn ttl_policy(&self) -> TtlPolicy {
        match self {
            Self::Quote => TtlPolicy {
                memory: Duration::from_secs(10),
                remote: Duration::from_secs(30),
                durable: None,
            },
            Self::Bars => TtlPolicy {
                memory: Duration::from_secs(60),
                remote: Duration::from_secs(5 * 60),
                durable: Some(Ttl::Forever),
            },
            Self::BasicInfo => TtlPolicy {
                memory: Duration::from_secs(60 * 60),
                remote: Duration::from_secs(12 * 60 * 60),
                durable: Some(Ttl::Expires(Duration::from_secs(24 * 60 * 60))),
            },
            Self::Indicator => TtlPolicy {
                memory: Duration::from_secs(60),
                remote: Duration::from_secs(5 * 60),
                durable: Some(Ttl::Expires(Duration::from_secs(60 * 60))),
            },
        }
    }

    /// Returns true if the durable tier keeps this kind as individual records
    /// maintained by the range resolver rather than as keyed payloads.
    #[must_use]
    pub const fn is_bar_series(&self) -> bool {
        matches!(self, Self::Bars)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown data kind: {s}")))
    }
}

/// Lifetime of a cached value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    /// Expires after the given duration.
    Expires(Duration),
    /// Never expires; only explicit invalidation removes it.
    Forever,
}

impl Ttl {
    /// Returns the duration, or `None` for [`Ttl::Forever`].
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        match self {
            Self::Expires(d) => Some(*d),
            Self::Forever => None,
        }
    }

    /// Caps this TTL at `limit`.
    #[must_use]
    pub fn capped(self, limit: Duration) -> Duration {
        match self {
            Self::Expires(d) => d.min(limit),
            Self::Forever => limit,
        }
    }
}

/// Per-tier TTLs for one [`DataKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    /// TTL in the in-process tier.
    pub memory: Duration,
    /// TTL in the shared remote tier.
    pub remote: Duration,
    /// TTL in the durable tier; `None` if the kind is not persisted.
    pub durable: Option<Ttl>,
}

/// Deterministic cache key.
///
/// Two logically identical requests always produce byte-identical keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    kind: DataKind,
    text: String,
}

impl CacheKey {
    /// Starts building a key of the given kind.
    #[must_use]
    pub fn builder(kind: DataKind) -> CacheKeyBuilder {
        CacheKeyBuilder {
            kind,
            scope: None,
            granularity: None,
            params: BTreeMap::new(),
        }
    }

    /// Key for a quote request over a set of symbols.
    ///
    /// Symbols are sorted and de-duplicated.
    #[must_use]
    pub fn quotes(symbols: &[Symbol]) -> Self {
        Self::builder(DataKind::Quote).symbols(symbols).build()
    }

    /// Key for a market's instrument list.
    #[must_use]
    pub fn basic_info(market: Market) -> Self {
        Self::builder(DataKind::BasicInfo).scope(market.as_str()).build()
    }

    /// Returns the data kind.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        self.kind
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builder for [`CacheKey`].
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    kind: DataKind,
    scope: Option<String>,
    granularity: Option<Granularity>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Scopes the key to a single symbol.
    #[must_use]
    pub fn symbol(mut self, symbol: &Symbol) -> Self {
        self.scope = Some(symbol.as_str().to_string());
        self
    }

    /// Scopes the key to a set of symbols (sorted, de-duplicated).
    #[must_use]
    pub fn symbols(mut self, symbols: &[Symbol]) -> Self {
        let mut names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        names.sort_unstable();
        names.dedup();
        self.scope = Some(names.join(","));
        self
    }

    /// Scopes the key to an arbitrary name (e.g. a market code).
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the bar granularity.
    #[must_use]
    pub const fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Adds a named parameter. Setting the same name twice keeps the last value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Builds the key.
    #[must_use]
    pub fn build(self) -> CacheKey {
        let mut text = String::from(self.kind.as_str());
        text.push(':');
        text.push_str(self.scope.as_deref().unwrap_or("*"));
        if let Some(granularity) = self.granularity {
            text.push(':');
            text.push_str(granularity.as_str());
        }
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            text.push(':');
            text.push_str(&params.join("|"));
        }
        CacheKey {
            kind: self.kind,
            text,
        }
    }
}
