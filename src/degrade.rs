//! Error-rate based degradation per key-class.
//!
//! There is no breaker state machine: every `is_degrade_allowed` call recomputes the
//! decision from the current window's request and error counters. Both counters live
//! in one remote window, so they open and expire together and recovery needs no
//! explicit reset.

use crate::counter::{AtomicWindowCounter, OutcomeWindow};
use crate::errors::CacheError;
use crate::registry::{ConfigRegistry, Validate};
use crate::utils::num::percent;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradeConfig {
    pub error_rate_threshold_percent: f64,
    pub min_request_count: u64,
    pub time_window_secs: u64,
    pub enabled: bool,
}

impl Default for DegradeConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold_percent: 50.0,
            min_request_count: 20,
            time_window_secs: 10,
            enabled: true,
        }
    }
}

impl Validate for DegradeConfig {
    fn validate(&self) -> Result<(), CacheError> {
        let t = self.error_rate_threshold_percent;
        if !t.is_finite() || !(0.0..=100.0).contains(&t) {
            return Err(CacheError::ConfigInvalid(format!(
                "error_rate_threshold_percent must be within 0..=100, got {t}"
            )));
        }
        if self.min_request_count == 0 {
            return Err(CacheError::ConfigInvalid("min_request_count must be at least 1".into()));
        }
        if self.time_window_secs == 0 {
            return Err(CacheError::ConfigInvalid("time_window_secs must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct OutcomeCounts {
    requests: AtomicU64,
    errors: AtomicU64,
}

/// Process-local view of recorded outcomes since the last config reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradeStats {
    pub config: DegradeConfig,
    pub requests: u64,
    pub errors: u64,
}

impl DegradeStats {
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        percent(self.errors, self.requests)
    }
}

pub struct DegradeController {
    counter: AtomicWindowCounter,
    key_prefix: String,
    configs: ConfigRegistry<DegradeConfig>,
    local: RwLock<HashMap<String, Arc<OutcomeCounts>>>,
}

impl DegradeController {
    pub fn new(counter: AtomicWindowCounter, key_prefix: &str) -> Self {
        Self::with_default(counter, key_prefix, DegradeConfig::default())
    }

    pub fn with_default(counter: AtomicWindowCounter, key_prefix: &str, default: DegradeConfig) -> Self {
        Self {
            counter,
            key_prefix: key_prefix.to_string(),
            configs: ConfigRegistry::new("degrade", default),
            local: RwLock::new(HashMap::new()),
        }
    }

    fn outcome_key(&self, key_class: &str) -> String {
        format!("{}:degrade:{key_class}", self.key_prefix)
    }

    fn local_counts(&self, key_class: &str) -> Arc<OutcomeCounts> {
        if let Some(c) = self.local.read().get(key_class) {
            return c.clone();
        }
        self.local.write().entry(key_class.to_string()).or_default().clone()
    }

    /// Counts one remote operation for `key_class`, and an error when `success` is false.
    /// Remote recording is skipped while degradation is disabled for the class.
    pub fn record_outcome(&self, key_class: &str, success: bool) -> Result<(), CacheError> {
        let local = self.local_counts(key_class);
        local.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            local.errors.fetch_add(1, Ordering::Relaxed);
        }

        let config = self.configs.get(key_class);
        if !config.enabled {
            return Ok(());
        }
        self.counter.record_outcome(&self.outcome_key(key_class), config.time_window_secs, !success)?;
        Ok(())
    }

    /// Request and error counts of the current window, read together from the remote store.
    pub fn window_counts(&self, key_class: &str) -> Result<OutcomeWindow, CacheError> {
        let window = self.configs.get(key_class).time_window_secs;
        self.counter.current_outcome(&self.outcome_key(key_class), window)
    }

    /// Whether callers may skip the remote tier for `key_class`. Unreadable counters
    /// never count as a high error rate: remote failures here yield `false`.
    pub fn is_degrade_allowed(&self, key_class: &str) -> bool {
        let config = self.configs.get(key_class);
        if !config.enabled {
            return false;
        }
        let counts = match self.window_counts(key_class) {
            Ok(counts) => counts,
            Err(e) => {
                log::warn!(
                    target: "tierlite::degrade",
                    "degrade counters unreadable, not degrading: key_class={key_class} error={e}"
                );
                return false;
            }
        };
        if counts.requests < config.min_request_count {
            return false;
        }
        let error_rate = percent(counts.errors, counts.requests);
        let degrade = error_rate >= config.error_rate_threshold_percent;
        if degrade {
            log::info!(
                target: "tierlite::metrics",
                "degrading key_class={key_class} error_rate={error_rate:.1}% requests={} errors={}",
                counts.requests,
                counts.errors
            );
            crate::dev6!(
                "{{\"op\":\"degrade\",\"key_class\":\"{}\",\"error_rate\":{:.1}}}",
                key_class,
                error_rate
            );
        }
        degrade
    }

    pub fn get_config(&self, key_class: &str) -> DegradeConfig {
        self.configs.get(key_class)
    }

    pub fn update_config(&self, key_class: &str, config: DegradeConfig) -> Result<(), CacheError> {
        self.configs.update(key_class, config)
    }

    pub fn set_default_config(&self, config: DegradeConfig) -> Result<(), CacheError> {
        self.configs.set_default(config)
    }

    /// Drops the override and local counts, and deletes the remote window (best effort).
    pub fn reset_config(&self, key_class: &str) {
        self.configs.reset(key_class);
        self.local.write().remove(key_class);
        let key = self.outcome_key(key_class);
        if let Err(e) = self.counter.reset(&key) {
            log::warn!(target: "tierlite::degrade", "failed to delete {key}: {e}");
        }
    }

    pub fn stats(&self, key_class: &str) -> DegradeStats {
        let local = self.local.read().get(key_class).cloned();
        DegradeStats {
            config: self.configs.get(key_class),
            requests: local.as_ref().map_or(0, |c| c.requests.load(Ordering::Relaxed)),
            errors: local.as_ref().map_or(0, |c| c.errors.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn controller(store: Arc<MemoryRemoteStore>) -> DegradeController {
        DegradeController::new(AtomicWindowCounter::new(store), "t")
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let bad = DegradeConfig { error_rate_threshold_percent: 120.0, ..Default::default() };
        assert!(bad.validate().is_err());
        let nan = DegradeConfig { error_rate_threshold_percent: f64::NAN, ..Default::default() };
        assert!(nan.validate().is_err());
        assert!(DegradeConfig { min_request_count: 0, ..Default::default() }.validate().is_err());
        assert!(DegradeConfig { time_window_secs: 0, ..Default::default() }.validate().is_err());
        assert!(DegradeConfig::default().validate().is_ok());
    }

    #[test]
    fn disabled_never_degrades_and_skips_remote() {
        let store = Arc::new(MemoryRemoteStore::new());
        let d = controller(store.clone());
        d.update_config("docs", DegradeConfig { enabled: false, ..Default::default() }).unwrap();
        let before = store.round_trips();
        for _ in 0..30 {
            d.record_outcome("docs", false).unwrap();
        }
        assert!(!d.is_degrade_allowed("docs"));
        assert_eq!(store.round_trips(), before);
        assert_eq!(d.stats("docs").errors, 30);
    }

    #[test]
    fn error_rate_at_threshold_degrades() {
        let d = controller(Arc::new(MemoryRemoteStore::new()));
        let cfg = DegradeConfig { min_request_count: 4, error_rate_threshold_percent: 50.0, ..Default::default() };
        d.update_config("docs", cfg).unwrap();
        d.record_outcome("docs", true).unwrap();
        d.record_outcome("docs", true).unwrap();
        d.record_outcome("docs", false).unwrap();
        assert!(!d.is_degrade_allowed("docs"), "below the sample floor");
        d.record_outcome("docs", false).unwrap();
        assert!(d.is_degrade_allowed("docs"));
        assert!((d.stats("docs").error_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unreadable_counters_do_not_degrade() {
        let store = Arc::new(MemoryRemoteStore::new());
        let d = controller(store.clone());
        d.update_config("docs", DegradeConfig { min_request_count: 1, ..Default::default() }).unwrap();
        d.record_outcome("docs", false).unwrap();
        assert!(d.is_degrade_allowed("docs"));
        store.set_available(false);
        assert!(!d.is_degrade_allowed("docs"));
        assert!(d.record_outcome("docs", false).unwrap_err().is_remote_unavailable());
    }

    #[test]
    fn reset_config_clears_remote_and_local_counts() {
        let d = controller(Arc::new(MemoryRemoteStore::new()));
        d.update_config("docs", DegradeConfig { min_request_count: 1, ..Default::default() }).unwrap();
        d.record_outcome("docs", false).unwrap();
        d.reset_config("docs");
        assert_eq!(d.stats("docs").requests, 0);
        assert_eq!(d.window_counts("docs").unwrap(), OutcomeWindow::empty());
        assert_eq!(d.get_config("docs"), DegradeConfig::default());
    }
}
