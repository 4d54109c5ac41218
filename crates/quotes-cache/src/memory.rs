//! In-process cache tier.

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use quotes_core::{CacheEntry, CacheKey, DataError, Result, TierKind, TierStore, Ttl};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Cached payload with its expiry deadline and last-touch tick.
#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    deadline: Option<Instant>,
    touched: u64,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

type Shard = LruCache<CacheKey, Slot>;

/// Bounded in-process cache tier.
///
/// Entries live in LRU maps (hash map plus recency list, O(1) per operation),
/// split across independently locked shards chosen by key hash so unrelated keys
/// do not contend. The bound is global: the tier never holds more than its
/// capacity, and an insert past it evicts the least recently touched entry of
/// the whole tier. Every successful `get` refreshes recency. Expired entries are
/// treated as absent and dropped lazily when touched.
#[derive(Debug)]
pub struct MemoryTier {
    shards: Box<[Mutex<Shard>]>,
    capacity: usize,
    /// Entries across all shards. Only changed while holding a shard lock.
    len: AtomicUsize,
    /// Monotonic recency clock shared by the shards.
    clock: AtomicU64,
}

impl MemoryTier {
    /// Create a single-shard tier holding at most `capacity` entries.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_shards(capacity, 1)
    }

    /// Create a tier holding at most `capacity` entries spread over `shards`
    /// locks.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `capacity` or `shards` is zero.
    pub fn with_shards(capacity: usize, shards: usize) -> Result<Self> {
        if shards == 0 {
            return Err(DataError::InvalidParameter(
                "memory tier needs at least one shard".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(DataError::InvalidParameter(
                "memory tier capacity must be non-zero".to_string(),
            ));
        }

        let shards = (0..shards)
            .map(|_| Mutex::new(LruCache::unbounded()))
            .collect();

        Ok(Self {
            shards,
            capacity,
            len: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
        })
    }

    /// Configured maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn shard(&self, key: &CacheKey) -> Result<MutexGuard<'_, Shard>> {
        let index = if self.shards.len() == 1 {
            0
        } else {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            (hasher.finish() % self.shards.len() as u64) as usize
        };
        self.shards[index]
            .lock()
            .map_err(|e| DataError::tier_unavailable(TierKind::Memory, e.to_string()))
    }

    /// Locks every shard in index order.
    fn lock_all(&self) -> Result<Vec<MutexGuard<'_, Shard>>> {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .map_err(|e| DataError::tier_unavailable(TierKind::Memory, e.to_string()))
            })
            .collect()
    }

    /// Evict globally least recently touched entries until the tier is back
    /// within capacity.
    fn evict_overflow(&self) -> Result<()> {
        let mut shards = self.lock_all()?;
        while self.len.load(Ordering::Acquire) > self.capacity {
            // Each shard's LRU end is its oldest entry; the oldest of those is
            // the oldest of the tier.
            let oldest = shards
                .iter()
                .enumerate()
                .filter_map(|(index, shard)| shard.peek_lru().map(|(_, slot)| (slot.touched, index)))
                .min();
            let Some((_, index)) = oldest else {
                break;
            };
            if let Some((evicted, _)) = shards[index].pop_lru() {
                self.len.fetch_sub(1, Ordering::AcqRel);
                debug!(evicted = %evicted, "Evicted least recently used memory entry");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TierStore for MemoryTier {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut shard = self.shard(key)?;
        let now = Instant::now();
        let touched = self.tick();

        match shard.get_mut(key) {
            None => return Ok(None),
            Some(slot) if !slot.is_expired(now) => {
                slot.touched = touched;
                let ttl = match slot.deadline {
                    Some(deadline) => Ttl::Expires(deadline.saturating_duration_since(now)),
                    None => Ttl::Forever,
                };
                return Ok(Some(CacheEntry {
                    key: key.clone(),
                    value: slot.value.clone(),
                    stored_at: Utc::now(),
                    ttl,
                    origin: TierKind::Memory,
                }));
            }
            Some(_) => {}
        }

        if shard.pop(key).is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        trace!(key = %key, "Dropped expired memory entry");
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Ttl) -> Result<()> {
        let overflow = {
            let mut shard = self.shard(key)?;
            let slot = Slot {
                value: value.to_vec(),
                deadline: ttl.duration().map(|d| Instant::now() + d),
                touched: self.tick(),
            };
            match shard.put(key.clone(), slot) {
                Some(_) => false,
                None => self.len.fetch_add(1, Ordering::AcqRel) + 1 > self.capacity,
            }
        };

        if overflow {
            self.evict_overflow()?;
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let removed = self.shard(key)?.pop(key).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(removed)
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.lock_all()?.iter().map(|shard| shard.len()).sum())
    }

    async fn clear(&self) -> Result<()> {
        let mut shards = self.lock_all()?;
        for shard in &mut shards {
            shard.clear();
        }
        self.len.store(0, Ordering::Release);
        debug!("Cleared memory tier");
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut removed = 0usize;
        let mut shards = self.lock_all()?;
        for shard in &mut shards {
            let expired: Vec<CacheKey> = shard
                .iter()
                .filter(|(_, slot)| slot.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                shard.pop(key);
            }
            removed += expired.len();
        }
        self.len.fetch_sub(removed, Ordering::AcqRel);
        drop(shards);
        if removed > 0 {
            debug!("Purged {} expired memory entries", removed);
        }
        Ok(removed)
    }
}
