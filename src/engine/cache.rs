use crate::degrade::DegradeController;
use crate::engine::config::CacheConfig;
use crate::errors::CacheError;
use crate::local::{InsertOutcome, LocalTier, LocalTierConfig};
use crate::ratelimit::RateLimiter;
use crate::registry::Validate;
use crate::remote::{RemoteStore, RemoteTier};
use crate::stats::{CacheStats, StatsAggregator, TypeStats};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

/// Collaborators an engine may share with other engines.
#[derive(Clone)]
pub struct EngineOptions {
    pub key_prefix: String,
    /// Shard count, overflow policy and purge interval; `max_size` is taken from `CacheConfig`.
    pub local: LocalTierConfig,
    pub stats: Option<Arc<StatsAggregator>>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub degrade: Option<Arc<DegradeController>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            key_prefix: "tierlite".to_string(),
            local: LocalTierConfig::default(),
            stats: None,
            rate_limiter: None,
            degrade: None,
        }
    }
}

/// Read-through/write-through cache for one cache type.
///
/// Writes go to the remote tier first and only then to the local tier, so a
/// failed remote write never leaves a value visible to this process alone.
/// Concurrent writers to one key get last-write-wins per tier; there is no
/// cross-tier transaction. The cache type doubles as the rate-limit and degrade
/// key-class.
pub struct CacheEngine {
    cache_type: String,
    config: RwLock<Arc<CacheConfig>>,
    local: LocalTier,
    remote: RemoteTier,
    stats: Arc<TypeStats>,
    rate_limiter: Option<Arc<RateLimiter>>,
    degrade: Option<Arc<DegradeController>>,
}

impl CacheEngine {
    pub fn new(
        cache_type: &str,
        config: CacheConfig,
        store: Arc<dyn RemoteStore>,
    ) -> Result<Self, CacheError> {
        Self::new_with_options(cache_type, config, store, EngineOptions::default())
    }

    pub fn new_with_options(
        cache_type: &str,
        config: CacheConfig,
        store: Arc<dyn RemoteStore>,
        options: EngineOptions,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let stats = match &options.stats {
            Some(agg) => agg.for_type(cache_type),
            None => Arc::new(TypeStats::default()),
        };
        let local_config = LocalTierConfig { max_size: config.max_local_size, ..options.local };
        Ok(Self {
            cache_type: cache_type.to_string(),
            local: LocalTier::with_stats(local_config, stats.clone()),
            remote: RemoteTier::new(store, &options.key_prefix, cache_type),
            config: RwLock::new(Arc::new(config)),
            stats,
            rate_limiter: options.rate_limiter,
            degrade: options.degrade,
        })
    }

    pub fn cache_type(&self) -> &str {
        &self.cache_type
    }

    /// The current config snapshot.
    pub fn config(&self) -> Arc<CacheConfig> {
        self.config.read().clone()
    }

    /// Replaces the config snapshot. Invalid configs leave the current one in place.
    pub fn update_config(&self, config: CacheConfig) -> Result<(), CacheError> {
        config.validate()?;
        self.local.set_max_size(config.max_local_size);
        log::info!(
            target: "tierlite::audit",
            "cache config updated: type={} config={config:?}",
            self.cache_type
        );
        *self.config.write() = Arc::new(config);
        Ok(())
    }

    pub fn local_tier(&self) -> &LocalTier {
        &self.local
    }

    pub fn remote_tier(&self) -> &RemoteTier {
        &self.remote
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn acquire(&self) -> Result<(), CacheError> {
        match &self.rate_limiter {
            Some(limiter) if !limiter.try_acquire(&self.cache_type, 1) => {
                Err(CacheError::RateLimited { key_class: self.cache_type.clone() })
            }
            _ => Ok(()),
        }
    }

    fn remote_degraded(&self) -> bool {
        self.degrade.as_ref().is_some_and(|d| d.is_degrade_allowed(&self.cache_type))
    }

    fn record_remote(&self, success: bool) {
        if let Some(degrade) = &self.degrade
            && let Err(e) = degrade.record_outcome(&self.cache_type, success)
        {
            log::debug!(target: "tierlite::engine", "degrade outcome not recorded: {e}");
        }
    }

    /// Local tier, then remote tier with write-back into the local tier. A remote
    /// read failure counts as a remote miss.
    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        let cfg = self.config();
        if cfg.local_enabled
            && let Some(value) = self.local.get(key)
        {
            self.stats.record_hit();
            return Some(value);
        }
        if cfg.remote_enabled && !self.remote_degraded() {
            match self.remote.get(key) {
                Ok(Some(value)) => {
                    self.record_remote(true);
                    if cfg.local_enabled {
                        self.local.put(key, value.clone(), cfg.local_ttl());
                    }
                    self.stats.record_hit();
                    return Some(value);
                }
                Ok(None) => self.record_remote(true),
                Err(e) => {
                    log::warn!(
                        target: "tierlite::engine",
                        "remote read failed, treating as miss: type={} key={key} error={e}",
                        self.cache_type
                    );
                    self.record_remote(false);
                }
            }
        }
        self.stats.record_miss();
        None
    }

    fn write_through(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let cfg = self.config();
        if cfg.remote_enabled {
            if let Err(e) = self.remote.put(key, &value, cfg.remote_ttl()) {
                self.record_remote(false);
                // Drop any older local copy so reads fall back to the remote tier.
                self.local.delete(key);
                return Err(e);
            }
            self.record_remote(true);
        }
        if cfg.local_enabled && self.local.put(key, value, cfg.local_ttl()) == InsertOutcome::Rejected
        {
            log::debug!(
                target: "tierlite::engine",
                "local tier full, value kept remote only: type={} key={key}",
                self.cache_type
            );
        }
        Ok(())
    }

    /// Returns the cached value, or `None` when neither tier holds it.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.acquire()?;
        Ok(self.lookup(key))
    }

    /// Like `get`, but on a full miss calls `loader` and caches its result in both
    /// tiers. Loader errors propagate as `LoaderFailure` and nothing is cached. If the
    /// write-back fails after a successful load the value is still returned.
    pub fn get_or_load<F, E>(&self, key: &str, loader: F) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
        E: Display,
    {
        self.acquire()?;
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }
        let started = Instant::now();
        match loader() {
            Ok(value) => {
                self.stats.record_load_success(started.elapsed());
                if let Err(e) = self.write_through(key, value.clone()) {
                    log::warn!(
                        target: "tierlite::engine",
                        "loaded value not cached: type={} key={key} error={e}",
                        self.cache_type
                    );
                }
                Ok(value)
            }
            Err(e) => {
                self.stats.record_load_failure();
                log::error!(
                    target: "tierlite::engine",
                    "loader failed: type={} key={key} error={e}",
                    self.cache_type
                );
                Err(CacheError::LoaderFailure(e.to_string()))
            }
        }
    }

    /// Writes to the remote tier, then the local tier. Remote failures propagate and
    /// leave the local tier without the key.
    pub fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.acquire()?;
        self.write_through(key, value)
    }

    /// Deletes from both tiers. The local delete always happens; a remote failure is
    /// reported afterwards. Invalidation is never rate limited.
    pub fn evict(&self, key: &str) -> Result<(), CacheError> {
        self.local.delete(key);
        if self.config().remote_enabled {
            match self.remote.delete(key) {
                Ok(_) => self.record_remote(true),
                Err(e) => {
                    self.record_remote(false);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Clears the local tier only. Remote entries are shared with other instances
    /// and stay in place. Returns how many local entries were dropped.
    pub fn clear(&self) -> usize {
        let n = self.local.clear();
        log::info!(target: "tierlite::audit", "local tier cleared: type={} entries={n}", self.cache_type);
        n
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        self.put(key, serde_json::to_vec(value)?)
    }

    pub fn get_or_load_json<T, F, E>(&self, key: &str, loader: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let bytes = self.get_or_load(key, || match loader() {
            Ok(v) => serde_json::to_vec(&v).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn engine(store: &Arc<MemoryRemoteStore>) -> CacheEngine {
        CacheEngine::new("docs", CacheConfig::default(), store.clone()).unwrap()
    }

    #[test]
    fn remote_hit_is_written_back_locally() {
        let store = Arc::new(MemoryRemoteStore::new());
        let a = engine(&store);
        let b = engine(&store);
        a.put("k", b"v".to_vec()).unwrap();
        assert!(!b.local_tier().contains_key("k"));
        assert_eq!(b.get("k").unwrap(), Some(b"v".to_vec()));
        assert!(b.local_tier().contains_key("k"));
        assert_eq!(b.stats().hits, 1);
        assert_eq!(b.stats().misses, 0);
    }

    #[test]
    fn failed_remote_put_leaves_local_empty() {
        let store = Arc::new(MemoryRemoteStore::new());
        let e = engine(&store);
        e.put("k", b"old".to_vec()).unwrap();
        store.set_available(false);
        assert!(e.put("k", b"new".to_vec()).unwrap_err().is_remote_unavailable());
        assert!(!e.local_tier().contains_key("k"));
    }

    #[test]
    fn evict_deletes_locally_even_when_remote_fails() {
        let store = Arc::new(MemoryRemoteStore::new());
        let e = engine(&store);
        e.put("k", b"v".to_vec()).unwrap();
        store.set_available(false);
        assert!(e.evict("k").unwrap_err().is_remote_unavailable());
        assert!(!e.local_tier().contains_key("k"));
        store.set_available(true);
        assert_eq!(e.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn invalid_update_keeps_previous_snapshot() {
        let store = Arc::new(MemoryRemoteStore::new());
        let e = engine(&store);
        let before = e.config();
        let bad = CacheConfig { local_ttl_secs: 0, ..Default::default() };
        assert!(matches!(e.update_config(bad), Err(CacheError::ConfigInvalid(_))));
        assert_eq!(*e.config(), *before);
        let smaller = CacheConfig { max_local_size: 3, ..Default::default() };
        e.update_config(smaller).unwrap();
        assert_eq!(e.local_tier().config().max_size, 3);
    }

    #[test]
    fn local_only_engine_never_touches_remote() {
        let store = Arc::new(MemoryRemoteStore::new());
        let cfg = CacheConfig { remote_enabled: false, ..Default::default() };
        let e = CacheEngine::new("docs", cfg, store.clone()).unwrap();
        store.set_available(false);
        e.put("k", b"v".to_vec()).unwrap();
        assert_eq!(e.get("k").unwrap(), Some(b"v".to_vec()));
        e.evict("k").unwrap();
        assert_eq!(store.round_trips(), 0);
    }
}
