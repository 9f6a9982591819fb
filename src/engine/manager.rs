use crate::config::TierliteConfig;
use crate::counter::AtomicWindowCounter;
use crate::degrade::DegradeController;
use crate::engine::cache::{CacheEngine, EngineOptions};
use crate::engine::config::CacheConfig;
use crate::errors::CacheError;
use crate::ratelimit::RateLimiter;
use crate::registry::Validate;
use crate::remote::RemoteStore;
use crate::stats::{CacheStats, StatsAggregator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds one `CacheEngine` per cache type. All engines share the remote store, the
/// stats aggregator, the rate limiter and the degrade controller.
pub struct CacheManager {
    store: Arc<dyn RemoteStore>,
    config: TierliteConfig,
    engines: RwLock<HashMap<String, Arc<CacheEngine>>>,
    stats: Arc<StatsAggregator>,
    rate_limiter: Arc<RateLimiter>,
    degrade: Arc<DegradeController>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn RemoteStore>) -> Result<Self, CacheError> {
        Self::from_config(TierliteConfig::default(), store)
    }

    /// Seeds limiter and degrade overrides from the config's per key-class sections.
    pub fn from_config(config: TierliteConfig, store: Arc<dyn RemoteStore>) -> Result<Self, CacheError> {
        config.validate()?;
        let prefix = config.remote.key_prefix.clone();
        let degrade = Arc::new(DegradeController::with_default(
            AtomicWindowCounter::new(store.clone()),
            &prefix,
            config.default_degrade(),
        ));
        let rate_limiter = Arc::new(
            RateLimiter::with_default(
                AtomicWindowCounter::new(store.clone()),
                &prefix,
                config.default_rate_limit(),
            )
            .with_degrade(degrade.clone()),
        );
        for (kc, cfg) in &config.rate_limit {
            if kc != crate::config::DEFAULT_SECTION {
                rate_limiter.update_config(kc, cfg.clone())?;
            }
        }
        for (kc, cfg) in &config.degrade {
            if kc != crate::config::DEFAULT_SECTION {
                degrade.update_config(kc, cfg.clone())?;
            }
        }
        Ok(Self {
            store,
            config,
            engines: RwLock::new(HashMap::new()),
            stats: Arc::new(StatsAggregator::new()),
            rate_limiter,
            degrade,
        })
    }

    /// The engine for `cache_type`, created on first use from the configured section.
    pub fn engine(&self, cache_type: &str) -> Result<Arc<CacheEngine>, CacheError> {
        if let Some(e) = self.engines.read().get(cache_type) {
            return Ok(e.clone());
        }
        let mut engines = self.engines.write();
        if let Some(e) = engines.get(cache_type) {
            return Ok(e.clone());
        }
        let options = EngineOptions {
            key_prefix: self.config.remote.key_prefix.clone(),
            local: self.config.local.clone(),
            stats: Some(self.stats.clone()),
            rate_limiter: Some(self.rate_limiter.clone()),
            degrade: Some(self.degrade.clone()),
        };
        let engine = Arc::new(CacheEngine::new_with_options(
            cache_type,
            self.config.cache_config(cache_type),
            self.store.clone(),
            options,
        )?);
        log::debug!(target: "tierlite::engine", "engine created: type={cache_type}");
        engines.insert(cache_type.to_string(), engine.clone());
        Ok(engine)
    }

    pub fn update_config(&self, cache_type: &str, config: CacheConfig) -> Result<(), CacheError> {
        config.validate()?;
        self.engine(cache_type)?.update_config(config)
    }

    pub fn stats(&self, cache_type: &str) -> CacheStats {
        self.stats.snapshot(cache_type)
    }

    #[must_use]
    pub fn stats_aggregator(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    #[must_use]
    pub fn degrade(&self) -> &Arc<DegradeController> {
        &self.degrade
    }

    /// Cache types with a live engine, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut v: Vec<String> = self.engines.read().keys().cloned().collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    #[test]
    fn engines_are_created_once_per_type() {
        let m = CacheManager::new(Arc::new(MemoryRemoteStore::new())).unwrap();
        let a = m.engine("users").unwrap();
        let b = m.engine("users").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        m.engine("orders").unwrap();
        assert_eq!(m.types(), vec!["orders".to_string(), "users".to_string()]);
    }

    #[test]
    fn config_sections_reach_engines_and_guards() {
        let cfg = TierliteConfig::from_toml_str(
            r#"
            [cache.users]
            max_local_size = 2

            [rate_limit.users]
            permits_per_second = 1
            burst_size = 0
            "#,
        )
        .unwrap();
        let m = CacheManager::from_config(cfg, Arc::new(MemoryRemoteStore::new())).unwrap();
        let users = m.engine("users").unwrap();
        assert_eq!(users.config().max_local_size, 2);
        assert_eq!(m.rate_limiter().get_config("users").permits_per_second, 1);
        users.put("a", b"1".to_vec()).unwrap();
        assert!(matches!(users.get("a"), Err(CacheError::RateLimited { .. })));
        // other types keep the default limits
        m.engine("orders").unwrap().put("a", b"1".to_vec()).unwrap();
    }

    #[test]
    fn stats_are_shared_through_the_aggregator() {
        let m = CacheManager::new(Arc::new(MemoryRemoteStore::new())).unwrap();
        let e = m.engine("users").unwrap();
        assert_eq!(e.get("missing").unwrap(), None);
        assert_eq!(m.stats("users").misses, 1);
        assert_eq!(m.stats_aggregator().total().misses, 1);
    }
}
