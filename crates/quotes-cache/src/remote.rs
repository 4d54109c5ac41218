//! Redis-backed remote tier.

use async_trait::async_trait;
use chrono::Utc;
use quotes_core::{CacheEntry, CacheKey, DataError, Result, TierKind, TierStore, Ttl};
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::RemoteConfig;

/// Keys requested per `SCAN` page.
const SCAN_COUNT: usize = 500;

/// Shared remote tier.
///
/// Every command is bounded by the configured operation timeout; a timeout or
/// connection error is reported as [`DataError::TierUnavailable`]. Keys are
/// namespaced with the configured prefix, and `size`/`clear` only touch keys
/// under that prefix.
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("prefix", &self.prefix)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisTier {
    /// Connect to the remote cache.
    ///
    /// # Errors
    /// Returns [`DataError::TierUnavailable`] if the URL is invalid or the server
    /// cannot be reached within the connect timeout.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(config.url.as_str())
            .map_err(|e| DataError::tier_unavailable(TierKind::Remote, e.to_string()))?;

        let conn = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                DataError::tier_unavailable(
                    TierKind::Remote,
                    format!("connect timed out after {:?}", config.connect_timeout()),
                )
            })?
            .map_err(|e| DataError::tier_unavailable(TierKind::Remote, e.to_string()))?;

        info!("Redis connection established");

        Ok(Self {
            conn,
            prefix: config.key_prefix.clone(),
            op_timeout: config.op_timeout(),
        })
    }

    fn namespaced(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }

    fn pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Await a command under the operation timeout.
    async fn bounded<T>(&self, op: &str, command: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DataError::tier_unavailable(
                TierKind::Remote,
                format!("{op}: {e}"),
            )),
            Err(_) => Err(DataError::tier_unavailable(
                TierKind::Remote,
                format!("{op} timed out after {:?}", self.op_timeout),
            )),
        }
    }

    /// Keys under the prefix, walked with `SCAN` one page per bounded command.
    async fn prefixed_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = self.pattern();
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, page): (u64, Vec<String>) = self
                .bounded("SCAN", scan_page(cursor, &pattern).query_async(&mut conn))
                .await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may report a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

fn scan_page(cursor: u64, pattern: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_COUNT);
    cmd
}

#[async_trait]
impl TierStore for RedisTier {
    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn.clone();
        let name = self.namespaced(key);

        let (value, pttl): (Option<Vec<u8>>, i64) = self
            .bounded(
                "GET",
                redis::pipe()
                    .cmd("GET")
                    .arg(&name)
                    .cmd("PTTL")
                    .arg(&name)
                    .query_async(&mut conn),
            )
            .await?;

        // PTTL: -2 missing, -1 no expiry.
        let ttl = match pttl {
            -1 => Ttl::Forever,
            ms if ms > 0 => Ttl::Expires(Duration::from_millis(ms.unsigned_abs())),
            _ => return Ok(None),
        };

        Ok(value.map(|value| CacheEntry {
            key: key.clone(),
            value,
            stored_at: Utc::now(),
            ttl,
            origin: TierKind::Remote,
        }))
    }

    #[instrument(skip(self, value), fields(key = %key, bytes = value.len()))]
    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Ttl) -> Result<()> {
        let mut conn = self.conn.clone();
        let name = self.namespaced(key);

        let mut cmd = redis::cmd("SET");
        cmd.arg(&name).arg(value);
        if let Some(ttl) = ttl.duration() {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }

        let _: () = self.bounded("SET", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut conn = self.conn.clone();
        let name = self.namespaced(key);
        let deleted: i64 = self
            .bounded("DEL", redis::cmd("DEL").arg(&name).query_async(&mut conn))
            .await?;
        Ok(deleted > 0)
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.prefixed_keys().await?.len())
    }

    #[instrument(skip(self), fields(prefix = %self.prefix))]
    async fn clear(&self) -> Result<()> {
        let keys = self.prefixed_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut deleted = 0i64;
        for batch in keys.chunks(SCAN_COUNT) {
            deleted += self
                .bounded::<i64>("DEL", redis::cmd("DEL").arg(batch).query_async(&mut conn))
                .await?;
        }

        debug!("Cleared {} remote entries", deleted);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        // Redis expires keys itself.
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_page_matches_prefix() {
        let packed = scan_page(17, "quotes:*").get_packed_command();
        let text = String::from_utf8(packed).unwrap();
        for part in ["SCAN", "17", "MATCH", "quotes:*", "COUNT", "500"] {
            assert!(text.contains(part), "{part} missing from {text:?}");
        }
        assert!(!text.contains("KEYS"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let result = RedisTier::connect(&RemoteConfig::new("not a url")).await;
        assert!(matches!(
            result,
            Err(DataError::TierUnavailable {
                tier: TierKind::Remote,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let mut config = RemoteConfig::new("redis://127.0.0.1:1/0");
        config.connect_timeout_ms = 500;

        let err = RedisTier::connect(&config).await.unwrap_err();
        assert!(err.is_tier_unavailable());
    }
}
