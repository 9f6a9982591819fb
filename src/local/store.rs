use crate::local::config::{LocalTierConfig, OverflowPolicy};
use crate::local::entry::CacheEntry;
use crate::local::metrics::{LocalTierMetrics, LocalTierMetricsSnapshot};
use crate::local::policy::purge_expired;
use crate::stats::TypeStats;
use crate::utils::num::{duration_nanos, usize_to_u64};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub(crate) type Shard = Mutex<LruCache<String, CacheEntry>>;

/// Result of a local insert. `Rejected` is the capacity-rejection case: the value
/// was not stored and nothing else was displaced (under `OverflowPolicy::Reject`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
    Rejected,
}

pub(crate) struct Inner {
    pub(crate) shards: Box<[Shard]>,
    hasher: RandomState,
    pub(crate) len: AtomicUsize,
    config: RwLock<LocalTierConfig>,
    pub(crate) metrics: Arc<LocalTierMetrics>,
    pub(crate) stats: Option<Arc<TypeStats>>,
}

/// A thread-safe, bounded, TTL-expiring in-process store.
///
/// Keys hash to one of `shards` independently locked LRU maps, so operations on a
/// key are linearizable while unrelated keys never contend on a shared lock. The
/// global size is tracked with an atomic and is best-effort under concurrent writes.
#[derive(Clone)]
pub struct LocalTier {
    inner: Arc<Inner>,
}

impl LocalTier {
    /// Creates a local tier and starts its TTL purge thread.
    pub fn new(config: LocalTierConfig) -> Self {
        Self::build(config, None)
    }

    /// Like `new`, additionally reporting TTL and LRU evictions into `stats`.
    pub fn with_stats(config: LocalTierConfig, stats: Arc<TypeStats>) -> Self {
        Self::build(config, Some(stats))
    }

    fn build(config: LocalTierConfig, stats: Option<Arc<TypeStats>>) -> Self {
        let shards: Box<[Shard]> =
            (0..config.shards.max(1)).map(|_| Mutex::new(LruCache::unbounded())).collect();
        let inner = Arc::new(Inner {
            shards,
            hasher: RandomState::new(),
            len: AtomicUsize::new(0),
            config: RwLock::new(config),
            metrics: Arc::new(LocalTierMetrics::default()),
            stats,
        });
        spawn_purger(&inner);
        Self { inner }
    }

    fn shard_index(&self, key: &str) -> usize {
        let h = self.inner.hasher.hash_one(key);
        (h % usize_to_u64(self.inner.shards.len())) as usize
    }

    fn shard(&self, key: &str) -> &Shard {
        &self.inner.shards[self.shard_index(key)]
    }

    fn is_full(&self, max: usize) -> bool {
        self.inner.len.load(Ordering::Relaxed) >= max
    }

    fn note_ttl_eviction(&self) {
        self.inner.len.fetch_sub(1, Ordering::Relaxed);
        self.inner.metrics.ttl_evictions.fetch_add(1, Ordering::Relaxed);
        if let Some(s) = &self.inner.stats {
            s.record_evictions(1);
        }
    }

    /// Returns a live value, dropping it first if its TTL has passed.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let start = Instant::now();
        let mut guard = self.shard(key).lock();
        let found = guard
            .get(key)
            .map(|e| if e.is_expired_at(start) { None } else { Some(e.value.clone()) });
        let result = match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                // Lazy eviction on access
                guard.pop(key);
                drop(guard);
                self.note_ttl_eviction();
                None
            }
            None => None,
        };
        let counter =
            if result.is_some() { &self.inner.metrics.hits } else { &self.inner.metrics.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.total_get_ns.fetch_add(duration_nanos(start.elapsed()), Ordering::Relaxed);
        result
    }

    /// Reads an entry without touching recency or metrics.
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry> {
        self.shard(key).lock().peek(key).filter(|e| !e.is_expired()).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.peek_entry(key).is_some()
    }

    /// Stores `value` for `ttl`. At capacity, expired entries are swept first; if the
    /// tier is still full the overflow policy decides between rejecting the insert and
    /// evicting a least recently used entry.
    pub fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> InsertOutcome {
        let start = Instant::now();
        let idx = self.shard_index(key);
        let (max, overflow) = {
            let c = self.inner.config.read();
            (c.max_size, c.overflow)
        };

        if self.is_full(max) && !self.inner.shards[idx].lock().contains(key) {
            self.purge_expired_now();
            let made_room = !self.is_full(max)
                || (overflow == OverflowPolicy::EvictLru && self.evict_one_lru(idx));
            if !made_room {
                self.inner.metrics.capacity_rejections.fetch_add(1, Ordering::Relaxed);
                crate::dev6!(
                    "{{\"bench\":\"local\",\"op\":\"capacity_reject\",\"key\":\"{}\",\"max\":{}}}",
                    key,
                    max
                );
                return InsertOutcome::Rejected;
            }
        }

        // `len` moves under the shard lock so a racing delete of this key cannot
        // decrement before the increment lands.
        let replaced = {
            let mut shard = self.inner.shards[idx].lock();
            let replaced = shard.put(key.to_string(), CacheEntry::new(value, ttl)).is_some();
            if !replaced {
                self.inner.len.fetch_add(1, Ordering::Relaxed);
            }
            replaced
        };
        self.inner.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        self.inner
            .metrics
            .total_insert_ns
            .fetch_add(duration_nanos(start.elapsed()), Ordering::Relaxed);
        if replaced { InsertOutcome::Replaced } else { InsertOutcome::Inserted }
    }

    /// Evicts one entry, preferring the key's own shard. Only one shard lock is held
    /// at a time.
    fn evict_one_lru(&self, preferred: usize) -> bool {
        let n = self.inner.shards.len();
        for offset in 0..n {
            let idx = (preferred + offset) % n;
            let popped = self.inner.shards[idx].lock().pop_lru();
            if popped.is_some() {
                self.inner.len.fetch_sub(1, Ordering::Relaxed);
                self.inner.metrics.lru_evictions.fetch_add(1, Ordering::Relaxed);
                if let Some(s) = &self.inner.stats {
                    s.record_evictions(1);
                }
                crate::dev6!("{{\"bench\":\"local\",\"op\":\"lru_evict\",\"shard\":{}}}", idx);
                return true;
            }
        }
        false
    }

    /// Removes a key. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut shard = self.shard(key).lock();
            let removed = shard.pop(key);
            if removed.is_some() {
                self.inner.len.fetch_sub(1, Ordering::Relaxed);
            }
            removed
        };
        match removed {
            Some(entry) => {
                self.inner.metrics.removes.fetch_add(1, Ordering::Relaxed);
                !entry.is_expired()
            }
            None => false,
        }
    }

    /// Drops every entry. Returns how many were held.
    pub fn clear(&self) -> usize {
        let mut cleared = 0usize;
        for shard in &self.inner.shards {
            let mut guard = shard.lock();
            let n = guard.len();
            guard.clear();
            self.inner.len.fetch_sub(n, Ordering::Relaxed);
            cleared += n;
        }
        cleared
    }

    /// Number of held entries, including expired ones not yet purged.
    pub fn size(&self) -> usize {
        self.inner.len.load(Ordering::Relaxed)
    }

    /// Force a TTL purge now. Returns number evicted.
    pub fn purge_expired_now(&self) -> usize {
        purge_expired(&self.inner)
    }

    /// Get a snapshot of metrics.
    pub fn metrics_snapshot(&self) -> LocalTierMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> LocalTierConfig {
        self.inner.config.read().clone()
    }

    /// Runtime config updates. Shrinking does not evict; later inserts see the new bound.
    pub fn set_max_size(&self, max_size: usize) {
        self.inner.config.write().max_size = max_size;
    }
}

fn spawn_purger(inner: &Arc<Inner>) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let spawned = std::thread::Builder::new().name("tierlite-local-purge".into()).spawn(move || {
        loop {
            let secs = match weak.upgrade() {
                Some(inner) => inner.config.read().purge_interval_secs.max(1),
                None => break,
            };
            std::thread::sleep(Duration::from_secs(secs));
            match weak.upgrade() {
                Some(inner) => {
                    purge_expired(&inner);
                }
                None => break,
            }
        }
    });
    if let Err(e) = spawned {
        log::warn!(target: "tierlite::local", "purge thread not started, relying on lazy expiry: {e}");
    }
}
