//! SQLite-backed durable tier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quotes_core::{
    Bar, CacheEntry, CacheKey, DataError, DataKind, Granularity, RangeCoverage, Result, Symbol,
    TierKind, TierStore, TimeRange, Ttl,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, instrument};

/// Durable store for bar series, coverage and keyed payloads.
///
/// Bars are kept row by row in the `bars` table and reached through the
/// dedicated series methods ([`upsert_bars`](Self::upsert_bars),
/// [`load_bars`](Self::load_bars) and friends). As a [`TierStore`] the store
/// only accepts [`DataKind::BasicInfo`] and [`DataKind::Indicator`] payloads.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path, using WAL journaling.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DataError::Cache(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| DataError::Cache(e.to_string()))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| DataError::Cache(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| DataError::Cache(e.to_string()))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened SQLite store");

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| DataError::Cache(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::tier_unavailable(TierKind::Durable, e.to_string()))
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                symbol TEXT NOT NULL,
                granularity TEXT NOT NULL,
                time_key INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL,
                turnover REAL,
                is_final INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, granularity, time_key)
            );

            CREATE TABLE IF NOT EXISTS range_coverage (
                symbol TEXT NOT NULL,
                granularity TEXT NOT NULL,
                intervals_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, granularity)
            );

            CREATE TABLE IF NOT EXISTS indicator_results (
                cache_key TEXT PRIMARY KEY,
                payload BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_indicator_results_expires
             ON indicator_results(expires_at);

            CREATE TABLE IF NOT EXISTS reference_records (
                cache_key TEXT PRIMARY KEY,
                payload BLOB NOT NULL,
                stored_at INTEGER NOT NULL,
                expires_at INTEGER
            );",
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    /// Table holding keyed payloads of the given kind.
    fn table_for(kind: DataKind) -> Result<&'static str> {
        match kind {
            DataKind::Indicator => Ok("indicator_results"),
            DataKind::BasicInfo => Ok("reference_records"),
            DataKind::Quote | DataKind::Bars => Err(DataError::Cache(format!(
                "{kind} values are not stored as keyed records"
            ))),
        }
    }

    /// Insert or revise bars.
    ///
    /// A bar whose period has closed at `now` is stored as final. A row that is
    /// already final is never overwritten; open rows are replaced in place.
    /// Returns the number of rows written.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    #[instrument(skip(self, bars), fields(count = bars.len()))]
    pub fn upsert_bars(&self, bars: &[Bar], now: DateTime<Utc>) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }
        let updated_at = now.timestamp_millis();

        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let mut written = 0usize;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO bars
                     (symbol, granularity, time_key, open, high, low, close, volume, turnover, is_final, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(symbol, granularity, time_key) DO UPDATE SET
                        open = excluded.open,
                        high = excluded.high,
                        low = excluded.low,
                        close = excluded.close,
                        volume = excluded.volume,
                        turnover = excluded.turnover,
                        is_final = excluded.is_final,
                        updated_at = excluded.updated_at
                     WHERE bars.is_final = 0",
                )
                .map_err(|e| DataError::Cache(e.to_string()))?;

            for bar in bars {
                written += stmt
                    .execute(params![
                        bar.symbol.as_str(),
                        bar.granularity.as_str(),
                        bar.time_key.timestamp_millis(),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                        bar.turnover,
                        !bar.is_open_at(now),
                        updated_at,
                    ])
                    .map_err(|e| DataError::Cache(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| DataError::Cache(e.to_string()))?;
        debug!("Stored {} of {} bars", written, bars.len());
        Ok(written)
    }

    /// Load the stored bars of a series whose `time_key` lies in `range`, ascending.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    #[instrument(skip(self), fields(symbol = %symbol, granularity = %granularity))]
    pub fn load_bars(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        range: &TimeRange,
    ) -> Result<Vec<Bar>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT time_key, open, high, low, close, volume, turnover
                 FROM bars
                 WHERE symbol = ?1 AND granularity = ?2 AND time_key >= ?3 AND time_key < ?4
                 ORDER BY time_key ASC",
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![
                    symbol.as_str(),
                    granularity.as_str(),
                    range.start.timestamp_millis(),
                    range.end.timestamp_millis()
                ],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, Option<f64>>(6)?,
                    ))
                },
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let mut bars = Vec::new();
        for row in rows {
            let (time_key, open, high, low, close, volume, turnover) =
                row.map_err(|e| DataError::Cache(e.to_string()))?;
            bars.push(Bar {
                symbol: symbol.clone(),
                granularity,
                time_key: from_millis(time_key)?,
                open,
                high,
                low,
                close,
                volume,
                turnover,
            });
        }

        debug!("Loaded {} stored bars", bars.len());
        Ok(bars)
    }

    /// Load the durable coverage of a series; empty if nothing was recorded.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored intervals cannot be decoded.
    pub fn load_coverage(&self, symbol: &Symbol, granularity: Granularity) -> Result<RangeCoverage> {
        let conn = self.lock()?;
        let json = conn
            .query_row(
                "SELECT intervals_json FROM range_coverage WHERE symbol = ?1 AND granularity = ?2",
                params![symbol.as_str(), granularity.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        match json {
            Some(json) => {
                let intervals: Vec<TimeRange> =
                    serde_json::from_str(&json).map_err(|e| DataError::Parse(e.to_string()))?;
                Ok(RangeCoverage::from_intervals(
                    symbol.clone(),
                    granularity,
                    intervals,
                ))
            }
            None => Ok(RangeCoverage::new(symbol.clone(), granularity)),
        }
    }

    /// Persist the coverage of a series, replacing what was stored.
    ///
    /// # Errors
    /// Returns an error if the intervals cannot be encoded or the write fails.
    pub fn save_coverage(&self, coverage: &RangeCoverage) -> Result<()> {
        let json = serde_json::to_string(coverage.intervals())
            .map_err(|e| DataError::Parse(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO range_coverage (symbol, granularity, intervals_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                coverage.symbol.as_str(),
                coverage.granularity.as_str(),
                json,
                Utc::now().timestamp_millis()
            ],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!(
            symbol = %coverage.symbol,
            granularity = %coverage.granularity,
            intervals = coverage.intervals().len(),
            "Saved coverage"
        );
        Ok(())
    }

    /// Drop every stored bar and the coverage of a series. Returns the number of bars removed.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    #[instrument(skip(self), fields(symbol = %symbol, granularity = %granularity))]
    pub fn invalidate_series(&self, symbol: &Symbol, granularity: Granularity) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let removed = tx
            .execute(
                "DELETE FROM bars WHERE symbol = ?1 AND granularity = ?2",
                params![symbol.as_str(), granularity.as_str()],
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;
        tx.execute(
            "DELETE FROM range_coverage WHERE symbol = ?1 AND granularity = ?2",
            params![symbol.as_str(), granularity.as_str()],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        tx.commit().map_err(|e| DataError::Cache(e.to_string()))?;
        debug!("Invalidated series, removed {} bars", removed);
        Ok(removed)
    }

    /// Number of stored bars of a series.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn bar_count(&self, symbol: &Symbol, granularity: Granularity) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bars WHERE symbol = ?1 AND granularity = ?2",
                params![symbol.as_str(), granularity.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DataError::Parse(format!("Invalid timestamp: {ms}")))
}

#[async_trait]
impl TierStore for SqliteStore {
    fn kind(&self) -> TierKind {
        TierKind::Durable
    }

    fn accepts(&self, kind: DataKind) -> bool {
        matches!(kind, DataKind::BasicInfo | DataKind::Indicator)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let table = Self::table_for(key.kind())?;
        let now = Utc::now().timestamp_millis();

        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT payload, stored_at, expires_at FROM {table}
                     WHERE cache_key = ?1 AND (expires_at IS NULL OR expires_at > ?2)"
                ),
                params![key.as_str(), now],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let Some((value, stored_at, expires_at)) = row else {
            return Ok(None);
        };

        let ttl = match expires_at {
            Some(expires_at) => Ttl::Expires(Duration::from_millis(
                u64::try_from(expires_at - stored_at).unwrap_or_default(),
            )),
            None => Ttl::Forever,
        };
        Ok(Some(CacheEntry {
            key: key.clone(),
            value,
            stored_at: from_millis(stored_at)?,
            ttl,
            origin: TierKind::Durable,
        }))
    }

    #[instrument(skip(self, value), fields(key = %key, bytes = value.len()))]
    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Ttl) -> Result<()> {
        let table = Self::table_for(key.kind())?;
        let stored_at = Utc::now().timestamp_millis();
        let expires_at = ttl
            .duration()
            .map(|d| stored_at.saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)));

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} (cache_key, payload, stored_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![key.as_str(), value, stored_at, expires_at],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let table = Self::table_for(key.kind())?;
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                &format!("DELETE FROM {table} WHERE cache_key = ?1"),
                params![key.as_str()],
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn size(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM indicator_results)
                      + (SELECT COUNT(*) FROM reference_records)
                      + (SELECT COUNT(*) FROM bars)",
                [],
                |row| row.get(0),
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Removes keyed payloads as well as every bar series and its coverage.
    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "DELETE FROM indicator_results;
             DELETE FROM reference_records;
             DELETE FROM bars;
             DELETE FROM range_coverage;",
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("Cleared durable store");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock()?;

        let mut total_deleted = 0usize;
        for table in ["indicator_results", "reference_records"] {
            total_deleted += conn
                .execute(
                    &format!("DELETE FROM {table} WHERE expires_at IS NOT NULL AND expires_at <= ?1"),
                    params![now],
                )
                .map_err(|e| DataError::Cache(e.to_string()))?;
        }

        if total_deleted > 0 {
            debug!("Purged {} expired durable records", total_deleted);
        }
        Ok(total_deleted)
    }
}
