//! Tiered read-through / write-through cache manager.

use quotes_core::{CacheEntry, CacheKey, DataError, DataKind, Result, TierKind, TierStore, Ttl};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::flight::SingleFlight;
use crate::stats::{CacheStats, TierStats};

/// Which tiers a [`TieredCacheManager::clear`] call empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Every tier.
    All,
    /// Only the in-process tier.
    Memory,
    /// Only the remote tier.
    Remote,
    /// Only the durable tier.
    Durable,
}

impl ClearScope {
    const fn includes(self, tier: TierKind) -> bool {
        matches!(
            (self, tier),
            (Self::All, _)
                | (Self::Memory, TierKind::Memory)
                | (Self::Remote, TierKind::Remote)
                | (Self::Durable, TierKind::Durable)
        )
    }
}

/// TTL that `tier` applies to values of `kind`, or `None` if the tier does not hold them.
///
/// Bar series are kept row by row in the durable tier by the range resolver,
/// never as keyed payloads.
fn tier_ttl(tier: TierKind, kind: DataKind) -> Option<Ttl> {
    let policy = kind.ttl_policy();
    match tier {
        TierKind::Memory => Some(Ttl::Expires(policy.memory)),
        TierKind::Remote => Some(Ttl::Expires(policy.remote)),
        TierKind::Durable if kind.is_bar_series() => None,
        TierKind::Durable => policy.durable,
    }
}

/// TTL for a value copied up from a lower tier: never longer than what it had left.
fn promoted_ttl(remaining: Ttl, policy: Ttl) -> Ttl {
    match (remaining, policy) {
        (Ttl::Forever, policy) => policy,
        (remaining, Ttl::Forever) => remaining,
        (Ttl::Expires(left), Ttl::Expires(limit)) => Ttl::Expires(left.min(limit)),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| DataError::Parse(e.to_string()))
}

/// One configured tier with its counters.
#[derive(Debug)]
struct TierSlot {
    store: Arc<dyn TierStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    available: AtomicBool,
}

impl TierSlot {
    fn new(store: Arc<dyn TierStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    fn kind(&self) -> TierKind {
        self.store.kind()
    }

    fn holds(&self, kind: DataKind) -> bool {
        self.store.accepts(kind) && tier_ttl(self.kind(), kind).is_some()
    }

    fn mark_ok(&self) {
        if !self.available.swap(true, Ordering::Relaxed) {
            info!(tier = %self.kind(), "Cache tier available again");
        }
    }

    fn mark_failed(&self, op: &str, err: &DataError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if self.available.swap(false, Ordering::Relaxed) {
            warn!(tier = %self.kind(), op, error = %err, "Cache tier unavailable, skipping it");
        } else {
            debug!(tier = %self.kind(), op, error = %err, "Cache tier still unavailable");
        }
    }

    async fn probe(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.mark_ok();
                Some(entry)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.mark_ok();
                None
            }
            Err(e) => {
                self.mark_failed("get", &e);
                None
            }
        }
    }

    async fn write(&self, key: &CacheKey, value: &[u8], ttl: Ttl) {
        match self.store.put(key, value, ttl).await {
            Ok(()) => self.mark_ok(),
            Err(e) => self.mark_failed("put", &e),
        }
    }

    async fn remove(&self, key: &CacheKey) -> bool {
        match self.store.delete(key).await {
            Ok(removed) => {
                self.mark_ok();
                removed
            }
            Err(e) => {
                self.mark_failed("delete", &e);
                false
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    tiers: Vec<TierSlot>,
    flights: SingleFlight<CacheKey, Arc<Vec<u8>>>,
    upstream_timeout: Duration,
    loads: AtomicU64,
    load_failures: AtomicU64,
    missing_tiers: bool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Probe tiers in priority order, copying a hit into every faster tier.
    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let kind = key.kind();
        for (i, slot) in self.tiers.iter().enumerate() {
            if !slot.holds(kind) {
                continue;
            }
            if let Some(entry) = slot.probe(key).await {
                debug!(key = %key, tier = %slot.kind(), "Cache hit");
                self.promote(&self.tiers[..i], key, &entry).await;
                return Some(entry);
            }
        }
        None
    }

    async fn promote(&self, faster: &[TierSlot], key: &CacheKey, entry: &CacheEntry) {
        let remaining = entry.remaining();
        for slot in faster {
            if !slot.holds(key.kind()) {
                continue;
            }
            let Some(policy) = tier_ttl(slot.kind(), key.kind()) else {
                continue;
            };
            let ttl = promoted_ttl(remaining, policy);
            if ttl.duration().is_some_and(|d| d.is_zero()) {
                continue;
            }
            slot.write(key, &entry.value, ttl).await;
        }
    }

    async fn write_through(&self, key: &CacheKey, value: &[u8]) {
        for slot in &self.tiers {
            if !slot.holds(key.kind()) {
                continue;
            }
            if let Some(ttl) = tier_ttl(slot.kind(), key.kind()) {
                slot.write(key, value, ttl).await;
            }
        }
    }

    /// Leader side of a single-flight load.
    async fn load<T, Fut>(self: Arc<Self>, key: CacheKey, fetch: Fut) -> Result<Arc<Vec<u8>>>
    where
        T: Serialize,
        Fut: Future<Output = Result<T>>,
    {
        // A flight that finished between our probe and registration has already
        // populated the memory tier.
        for slot in self.tiers.iter().filter(|s| s.kind() == TierKind::Memory) {
            if let Some(entry) = slot.probe(&key).await {
                return Ok(Arc::new(entry.value));
            }
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        let value = match tokio::time::timeout(self.upstream_timeout, fetch).await {
            Ok(Ok(value)) => value,
            Ok(Err(e @ DataError::InsufficientData { .. })) => {
                debug!(key = %key, error = %e, "Nothing to cache");
                return Err(e);
            }
            Ok(Err(e)) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Upstream load failed");
                return Err(e);
            }
            Err(_) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, timeout = ?self.upstream_timeout, "Upstream load timed out");
                return Err(DataError::UpstreamFetchFailed(format!(
                    "{key} timed out after {:?}",
                    self.upstream_timeout
                )));
            }
        };

        let bytes = serde_json::to_vec(&value).map_err(|e| DataError::Parse(e.to_string()))?;
        self.write_through(&key, &bytes).await;
        debug!(key = %key, bytes = bytes.len(), "Loaded and cached");
        Ok(Arc::new(bytes))
    }

    async fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for slot in &self.tiers {
            match slot.store.purge_expired().await {
                Ok(n) => {
                    slot.mark_ok();
                    purged += n;
                }
                Err(e) => slot.mark_failed("purge", &e),
            }
        }
        purged
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(slot) = self.maintenance.get_mut() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Orchestrates the memory, remote and durable tiers.
///
/// Reads probe tiers in priority order and copy hits into faster tiers. On a
/// total miss, concurrent callers for the same key share a single upstream load,
/// whose result is written through to every tier that holds the key's kind.
///
/// Tier failures never reach callers: a failing tier is treated as a miss and
/// its availability flag flips, with a warning the first time. Loader errors are
/// returned unchanged and nothing is cached for them.
///
/// The manager is a cheap handle; clones share tiers, counters and in-flight loads.
#[derive(Debug, Clone)]
pub struct TieredCacheManager {
    inner: Arc<Inner>,
}

impl TieredCacheManager {
    /// Start configuring a manager.
    #[must_use]
    pub fn builder() -> TieredCacheManagerBuilder {
        TieredCacheManagerBuilder::default()
    }

    /// Return the cached value for `key`, or run `loader` once across all
    /// concurrent callers and cache its result.
    ///
    /// # Errors
    /// Returns the loader's error unchanged,
    /// [`DataError::UpstreamFetchFailed`] if the loader exceeds the upstream
    /// timeout, or [`DataError::Parse`] if the value cannot be (de)serialized.
    #[instrument(skip(self, loader), fields(key = %key))]
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(entry) = self.inner.lookup(key).await {
            match decode(&entry.value) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.invalidate(key).await;
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        let flight_key = key.clone();
        let bytes = self
            .inner
            .flights
            .run(key.clone(), move || inner.load(flight_key, loader()))
            .await?;
        decode(&bytes)
    }

    /// Return the cached value for `key` without loading on a miss.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the cached payload does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.inner.lookup(key).await {
            Some(entry) => decode(&entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// Write `value` to every tier that holds the key's kind.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the value cannot be serialized.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| DataError::Parse(e.to_string()))?;
        self.inner.write_through(key, &bytes).await;
        Ok(())
    }

    /// Delete `key` from every tier. Returns true if any tier held it.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut removed = false;
        for slot in &self.inner.tiers {
            if slot.holds(key.kind()) {
                removed |= slot.remove(key).await;
            }
        }
        debug!(key = %key, removed, "Invalidated");
        removed
    }

    /// Empty the tiers selected by `scope`.
    #[instrument(skip(self))]
    pub async fn clear(&self, scope: ClearScope) {
        for slot in self.inner.tiers.iter().filter(|s| scope.includes(s.kind())) {
            match slot.store.clear().await {
                Ok(()) => {
                    slot.mark_ok();
                    info!(tier = %slot.kind(), "Cleared cache tier");
                }
                Err(e) => slot.mark_failed("clear", &e),
            }
        }
    }

    /// Drop expired entries from every tier. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    /// Snapshot of per-tier counters and load statistics.
    pub async fn stats(&self) -> CacheStats {
        let mut tiers = Vec::with_capacity(self.inner.tiers.len());
        for slot in &self.inner.tiers {
            let size = match slot.store.size().await {
                Ok(size) => Some(size),
                Err(e) => {
                    slot.mark_failed("size", &e);
                    None
                }
            };
            tiers.push(TierStats {
                tier: slot.kind(),
                size,
                hits: slot.hits.load(Ordering::Relaxed),
                misses: slot.misses.load(Ordering::Relaxed),
                errors: slot.errors.load(Ordering::Relaxed),
                available: slot.available.load(Ordering::Relaxed),
            });
        }

        let degraded = self.inner.missing_tiers || tiers.iter().any(|t| !t.available);
        CacheStats {
            tiers,
            in_flight: self.inner.flights.in_flight(),
            loads: self.inner.loads.load(Ordering::Relaxed),
            load_failures: self.inner.load_failures.load(Ordering::Relaxed),
            degraded,
        }
    }

    /// The configured store for `kind`, if any.
    #[must_use]
    pub fn tier(&self, kind: TierKind) -> Option<Arc<dyn TierStore>> {
        self.inner
            .tiers
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| Arc::clone(&s.store))
    }

    /// Upper bound applied to each upstream load.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        self.inner.upstream_timeout
    }

    /// Start a background task that purges expired entries every `interval`.
    ///
    /// Replaces a previously started task. Must be called within a Tokio runtime.
    pub fn spawn_maintenance(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("Maintenance interval is zero, not starting purge task");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = inner.purge_expired().await;
                if purged > 0 {
                    debug!("Maintenance purged {} expired entries", purged);
                }
            }
        });

        if let Ok(mut slot) = self.inner.maintenance.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        info!(interval = ?interval, "Started cache maintenance");
    }

    /// Stop background maintenance.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.inner.maintenance.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
                info!("Stopped cache maintenance");
            }
        }
    }
}

/// Builder for [`TieredCacheManager`].
#[derive(Debug, Default)]
pub struct TieredCacheManagerBuilder {
    tiers: Vec<Arc<dyn TierStore>>,
    upstream_timeout: Option<Duration>,
    missing_tiers: bool,
}

impl TieredCacheManagerBuilder {
    /// Add a tier. Tiers are ordered memory, remote, durable regardless of call order.
    #[must_use]
    pub fn tier(mut self, store: Arc<dyn TierStore>) -> Self {
        self.tiers.push(store);
        self
    }

    /// Bound each upstream load (default 30 seconds).
    #[must_use]
    pub const fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = Some(timeout);
        self
    }

    /// Mark the manager as running with fewer tiers than configured.
    #[must_use]
    pub const fn missing_tiers(mut self, missing: bool) -> Self {
        self.missing_tiers = missing;
        self
    }

    /// Build the manager.
    #[must_use]
    pub fn build(mut self) -> TieredCacheManager {
        self.tiers.sort_by_key(|t| t.kind());
        let tiers: Vec<TierSlot> = self.tiers.into_iter().map(TierSlot::new).collect();
        debug!(
            tiers = ?tiers.iter().map(TierSlot::kind).collect::<Vec<_>>(),
            "Built tiered cache manager"
        );

        TieredCacheManager {
            inner: Arc::new(Inner {
                tiers,
                flights: SingleFlight::new(),
                upstream_timeout: self.upstream_timeout.unwrap_or(Duration::from_secs(30)),
                loads: AtomicU64::new(0),
                load_failures: AtomicU64::new(0),
                missing_tiers: self.missing_tiers,
                maintenance: Mutex::new(None),
            }),
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::memory::MemoryTier;
    use crate::sqlite::SqliteStore;
    use async_trait::async_trait;
    use quotes_core::{Market, Symbol};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct FailingTier;

    #[async_trait]
    impl TierStore for FailingTier {
        fn kind(&self) -> TierKind {
            TierKind::Remote
        }

        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }

        async fn put(&self, _key: &CacheKey, _value: &[u8], _ttl: Ttl) -> Result<()> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }

        async fn delete(&self, _key: &CacheKey) -> Result<bool> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }

        async fn size(&self) -> Result<usize> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }

        async fn clear(&self) -> Result<()> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }

        async fn purge_expired(&self) -> Result<usize> {
            Err(DataError::tier_unavailable(TierKind::Remote, "connection refused"))
        }
    }

    fn tiers() -> (Arc<MemoryTier>, Arc<SqliteStore>) {
        (
            Arc::new(MemoryTier::new(64).unwrap()),
            Arc::new(SqliteStore::in_memory().unwrap()),
        )
    }

    fn manager(memory: &Arc<MemoryTier>, durable: &Arc<SqliteStore>) -> TieredCacheManager {
        TieredCacheManager::builder()
            .tier(durable.clone())
            .tier(memory.clone())
            .build()
    }

    fn indicator_key() -> CacheKey {
        CacheKey::builder(DataKind::Indicator)
            .scope("AAPL")
            .param("fp", "deadbeef")
            .build()
    }

    #[tokio::test]
    async fn test_miss_loads_once_then_hits() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value: Vec<f64> = cache
                .get_or_fetch(&indicator_key(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1.0, 2.5])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1.0, 2.5]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memory.size().await.unwrap(), 1);
        assert_eq!(durable.size().await.unwrap(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.tier(TierKind::Memory).unwrap().hits, 2);
        assert!(!stats.degraded);
    }

    #[tokio::test]
    async fn test_durable_hit_repopulates_memory() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let key = CacheKey::basic_info(Market::Hk);

        durable
            .put(&key, br#"["00700"]"#, Ttl::Expires(Duration::from_secs(3600)))
            .await
            .unwrap();

        let value: Vec<String> = cache
            .get_or_fetch(&key, || async {
                Err(DataError::UpstreamFetchFailed("must not load".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, vec!["00700".to_string()]);

        let promoted = memory.get(&key).await.unwrap().unwrap();
        assert_eq!(promoted.value, br#"["00700"]"#);
        // Capped at the memory policy for reference data.
        assert!(promoted.ttl.duration().unwrap() <= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch(&indicator_key(), move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(42u32)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().await.in_flight, 0);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let key = CacheKey::quotes(&[Symbol::new("AAPL")]);

        let err = cache
            .get_or_fetch::<f64, _, _>(&key, || async {
                Err(DataError::UpstreamFetchFailed("503".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, DataError::UpstreamFetchFailed("503".to_string()));
        assert_eq!(memory.size().await.unwrap(), 0);

        // The next call loads again.
        let value: f64 = cache
            .get_or_fetch(&key, || async { Ok(101.5) })
            .await
            .unwrap();
        assert_eq!(value, 101.5);

        let stats = cache.stats().await;
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.load_failures, 1);
    }

    #[tokio::test]
    async fn test_insufficient_data_is_not_a_load_failure() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let key = CacheKey::quotes(&[Symbol::new("AAPL")]);
        let short = DataError::InsufficientData {
            indicator: "rsi".to_string(),
            required: 15,
            provided: 3,
        };

        let expected = short.clone();
        let err = cache
            .get_or_fetch::<f64, _, _>(&key, move || async move { Err(short) })
            .await
            .unwrap_err();
        assert_eq!(err, expected);
        assert_eq!(memory.size().await.unwrap(), 0);

        let stats = cache.stats().await;
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.load_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_loader_times_out() {
        let memory = Arc::new(MemoryTier::new(8).unwrap());
        let cache = TieredCacheManager::builder()
            .tier(memory)
            .upstream_timeout(Duration::from_secs(1))
            .build();

        let err = cache
            .get_or_fetch(&indicator_key(), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1u8)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::UpstreamFetchFailed(_)));
    }

    #[tokio::test]
    async fn test_failing_tier_is_skipped() {
        let memory = Arc::new(MemoryTier::new(8).unwrap());
        let cache = TieredCacheManager::builder()
            .tier(Arc::new(FailingTier))
            .tier(memory.clone())
            .build();

        let value: String = cache
            .get_or_fetch(&indicator_key(), || async { Ok("ok".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "ok");
        assert!(memory.get(&indicator_key()).await.unwrap().is_some());

        let stats = cache.stats().await;
        let remote = stats.tier(TierKind::Remote).unwrap();
        assert!(!remote.available);
        assert!(remote.errors >= 2);
        assert_eq!(remote.size, None);
        assert!(stats.degraded);
    }

    #[tokio::test]
    async fn test_quotes_are_not_durable() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let key = CacheKey::quotes(&[Symbol::new("00700")]);

        cache.put(&key, &vec![1.0, 2.0]).await.unwrap();

        assert_eq!(memory.size().await.unwrap(), 1);
        assert_eq!(durable.size().await.unwrap(), 0);
        assert_eq!(cache.get::<Vec<f64>>(&key).await.unwrap(), Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_scope() {
        let (memory, durable) = tiers();
        let cache = manager(&memory, &durable);
        let key = indicator_key();

        cache.put(&key, &7).await.unwrap();
        assert!(cache.invalidate(&key).await);
        assert_eq!(cache.get::<i32>(&key).await.unwrap(), None);

        cache.put(&key, &7).await.unwrap();
        cache.clear(ClearScope::Memory).await;
        assert_eq!(memory.size().await.unwrap(), 0);
        assert_eq!(durable.size().await.unwrap(), 1);

        cache.clear(ClearScope::All).await;
        assert_eq!(durable.size().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_purges_expired_entries() {
        let memory = Arc::new(MemoryTier::new(8).unwrap());
        let cache = TieredCacheManager::builder().tier(memory.clone()).build();
        let key = CacheKey::quotes(&[Symbol::new("AAPL")]);

        cache.put(&key, &1.0).await.unwrap();
        cache.spawn_maintenance(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(memory.size().await.unwrap(), 0);

        cache.shutdown();
    }

    #[test]
    fn test_promoted_ttl_never_exceeds_remaining() {
        let ten = Duration::from_secs(10);
        let sixty = Duration::from_secs(60);
        assert_eq!(
            promoted_ttl(Ttl::Expires(ten), Ttl::Expires(sixty)),
            Ttl::Expires(ten)
        );
        assert_eq!(
            promoted_ttl(Ttl::Forever, Ttl::Expires(sixty)),
            Ttl::Expires(sixty)
        );
        assert_eq!(tier_ttl(TierKind::Durable, DataKind::Bars), None);
        assert_eq!(tier_ttl(TierKind::Durable, DataKind::Quote), None);
    }
}
