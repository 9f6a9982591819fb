//! Fixed one-second window limiter per key-class.
//!
//! Each acquisition adds its permits to the class's remote window and is allowed
//! while the resulting count stays within `permits_per_second + burst_size`.
//! A limiter that cannot reach the remote store fails open.

use crate::counter::AtomicWindowCounter;
use crate::degrade::DegradeController;
use crate::errors::CacheError;
use crate::registry::{ConfigRegistry, Validate};
use crate::utils::num::percent;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const WINDOW_SECS: u64 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub permits_per_second: u64,
    pub burst_size: u64,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { permits_per_second: 100, burst_size: 200, enabled: true }
    }
}

impl RateLimitConfig {
    /// Highest count a window may reach.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.permits_per_second.saturating_add(self.burst_size)
    }
}

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), CacheError> {
        if self.permits_per_second == 0 {
            return Err(CacheError::ConfigInvalid("permits_per_second must be at least 1".into()));
        }
        if i64::try_from(self.limit()).is_err() {
            return Err(CacheError::ConfigInvalid("permits_per_second + burst_size overflows".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct LimiterCounts {
    requests: AtomicU64,
    rejections: AtomicU64,
    remote_failures: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub config: RateLimitConfig,
    pub requests: u64,
    pub rejections: u64,
    /// Acquisitions allowed because the counter store was unreachable.
    pub remote_failures: u64,
}

impl RateLimitStats {
    #[must_use]
    pub fn reject_rate(&self) -> f64 {
        percent(self.rejections, self.requests)
    }
}

pub struct RateLimiter {
    counter: AtomicWindowCounter,
    key_prefix: String,
    configs: ConfigRegistry<RateLimitConfig>,
    local: RwLock<HashMap<String, Arc<LimiterCounts>>>,
    degrade: Option<Arc<DegradeController>>,
}

impl RateLimiter {
    pub fn new(counter: AtomicWindowCounter, key_prefix: &str) -> Self {
        Self::with_default(counter, key_prefix, RateLimitConfig::default())
    }

    pub fn with_default(
        counter: AtomicWindowCounter,
        key_prefix: &str,
        default: RateLimitConfig,
    ) -> Self {
        Self {
            counter,
            key_prefix: key_prefix.to_string(),
            configs: ConfigRegistry::new("rate_limit", default),
            local: RwLock::new(HashMap::new()),
            degrade: None,
        }
    }

    /// Reports counter store failures to `degrade` as errors for the key-class.
    #[must_use]
    pub fn with_degrade(mut self, degrade: Arc<DegradeController>) -> Self {
        self.degrade = Some(degrade);
        self
    }

    fn counter_key(&self, key_class: &str) -> String {
        format!("{}:rate_limit:{key_class}", self.key_prefix)
    }

    fn local_counts(&self, key_class: &str) -> Arc<LimiterCounts> {
        if let Some(c) = self.local.read().get(key_class) {
            return c.clone();
        }
        self.local.write().entry(key_class.to_string()).or_default().clone()
    }

    /// Attempts to take `permits` from the current window. Never retries.
    pub fn try_acquire(&self, key_class: &str, permits: u32) -> bool {
        let config = self.configs.get(key_class);
        if !config.enabled || permits == 0 {
            return true;
        }
        let local = self.local_counts(key_class);
        local.requests.fetch_add(1, Ordering::Relaxed);

        let count = match self.counter.increment_and_get(
            &self.counter_key(key_class),
            WINDOW_SECS,
            i64::from(permits),
        ) {
            Ok(wc) => wc.count,
            Err(e) => {
                local.remote_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    target: "tierlite::ratelimit",
                    "rate limiter failing open: key_class={key_class} error={e}"
                );
                if let Some(degrade) = &self.degrade
                    && let Err(de) = degrade.record_outcome(key_class, false)
                {
                    log::debug!(target: "tierlite::ratelimit", "degrade record failed: {de}");
                }
                return true;
            }
        };

        if count <= config.limit() {
            return true;
        }
        local.rejections.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            target: "tierlite::metrics",
            "rate limited: key_class={key_class} permits={permits} count={count} limit={}",
            config.limit()
        );
        crate::dev6!(
            "{{\"op\":\"rate_limit_reject\",\"key_class\":\"{}\",\"count\":{}}}",
            key_class,
            count
        );
        false
    }

    pub fn get_config(&self, key_class: &str) -> RateLimitConfig {
        self.configs.get(key_class)
    }

    pub fn update_config(&self, key_class: &str, config: RateLimitConfig) -> Result<(), CacheError> {
        self.configs.update(key_class, config)
    }

    pub fn set_default_config(&self, config: RateLimitConfig) -> Result<(), CacheError> {
        self.configs.set_default(config)
    }

    /// Drops the override and the local request/rejection counts.
    pub fn reset_config(&self, key_class: &str) {
        self.configs.reset(key_class);
        self.local.write().remove(key_class);
    }

    pub fn stats(&self, key_class: &str) -> RateLimitStats {
        let config = self.configs.get(key_class);
        match self.local.read().get(key_class) {
            Some(c) => RateLimitStats {
                config,
                requests: c.requests.load(Ordering::Relaxed),
                rejections: c.rejections.load(Ordering::Relaxed),
                remote_failures: c.remote_failures.load(Ordering::Relaxed),
            },
            None => RateLimitStats { config, requests: 0, rejections: 0, remote_failures: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn limiter(store: Arc<MemoryRemoteStore>) -> RateLimiter {
        RateLimiter::new(AtomicWindowCounter::new(store), "t")
    }

    #[test]
    fn disabled_limiter_does_no_accounting() {
        let store = Arc::new(MemoryRemoteStore::new());
        let l = limiter(store.clone());
        l.update_config("docs", RateLimitConfig { enabled: false, ..Default::default() }).unwrap();
        let before = store.round_trips();
        for _ in 0..1000 {
            assert!(l.try_acquire("docs", 1));
        }
        assert_eq!(store.round_trips(), before);
        assert_eq!(l.stats("docs").requests, 0);
    }

    #[test]
    fn multi_permit_acquire_counts_all_permits() {
        let l = limiter(Arc::new(MemoryRemoteStore::new()));
        l.update_config("docs", RateLimitConfig { permits_per_second: 5, burst_size: 0, enabled: true })
            .unwrap();
        assert!(l.try_acquire("docs", 3));
        assert!(l.try_acquire("docs", 2));
        assert!(!l.try_acquire("docs", 1));
        let stats = l.stats("docs");
        assert_eq!((stats.requests, stats.rejections), (3, 1));
    }

    #[test]
    fn unreachable_store_fails_open_and_reports_to_degrade() {
        let store = Arc::new(MemoryRemoteStore::new());
        let degrade = Arc::new(DegradeController::new(AtomicWindowCounter::new(store.clone()), "t"));
        let l = limiter(store.clone()).with_degrade(degrade.clone());
        l.update_config("docs", RateLimitConfig { permits_per_second: 1, burst_size: 0, enabled: true })
            .unwrap();
        store.set_available(false);
        for _ in 0..5 {
            assert!(l.try_acquire("docs", 1));
        }
        assert_eq!(l.stats("docs").remote_failures, 5);
        assert_eq!(degrade.stats("docs").errors, 5);
    }

    #[test]
    fn invalid_config_is_rejected_and_previous_kept() {
        let l = limiter(Arc::new(MemoryRemoteStore::new()));
        let good = RateLimitConfig { permits_per_second: 3, burst_size: 1, enabled: true };
        l.update_config("docs", good.clone()).unwrap();
        let bad = RateLimitConfig { permits_per_second: 0, ..good.clone() };
        assert!(matches!(l.update_config("docs", bad), Err(CacheError::ConfigInvalid(_))));
        assert_eq!(l.get_config("docs"), good);
        l.reset_config("docs");
        assert_eq!(l.get_config("docs"), RateLimitConfig::default());
    }
}
