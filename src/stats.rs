//! Per cache-type counters: hits, misses, loads and local evictions.
//!
//! Counters only grow until an operator calls `reset`. Resets zero the counters in
//! place so engines and local tiers holding an `Arc<TypeStats>` keep recording
//! into the same instance.

use crate::utils::num::{duration_micros, percent};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct TypeStats {
    hits: AtomicU64,
    misses: AtomicU64,
    load_success: AtomicU64,
    load_failure: AtomicU64,
    total_load_time_micros: AtomicU64,
    evictions: AtomicU64,
}

impl TypeStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_success(&self, elapsed: Duration) {
        self.load_success.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_micros.fetch_add(duration_micros(elapsed), Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, n: u64) {
        if n > 0 {
            self.evictions.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_success: self.load_success.load(Ordering::Relaxed),
            load_failure: self.load_failure.load(Ordering::Relaxed),
            total_load_time_micros: self.total_load_time_micros.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for c in [
            &self.hits,
            &self.misses,
            &self.load_success,
            &self.load_failure,
            &self.total_load_time_micros,
            &self.evictions,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of one cache type's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_success: u64,
    pub load_failure: u64,
    pub total_load_time_micros: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits as a percentage of lookups.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        percent(self.hits, self.hits.saturating_add(self.misses))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_load_time_micros(&self) -> f64 {
        if self.load_success == 0 {
            0.0
        } else {
            self.total_load_time_micros as f64 / self.load_success as f64
        }
    }

    /// Successful loads as a percentage of all loads.
    #[must_use]
    pub fn load_success_rate(&self) -> f64 {
        percent(self.load_success, self.load_success.saturating_add(self.load_failure))
    }

    fn merge(&mut self, other: &Self) {
        self.hits = self.hits.saturating_add(other.hits);
        self.misses = self.misses.saturating_add(other.misses);
        self.load_success = self.load_success.saturating_add(other.load_success);
        self.load_failure = self.load_failure.saturating_add(other.load_failure);
        self.total_load_time_micros =
            self.total_load_time_micros.saturating_add(other.total_load_time_micros);
        self.evictions = self.evictions.saturating_add(other.evictions);
    }
}

#[derive(Default)]
pub struct StatsAggregator {
    types: RwLock<HashMap<String, Arc<TypeStats>>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorder for `cache_type`, registering it on first use.
    pub fn for_type(&self, cache_type: &str) -> Arc<TypeStats> {
        if let Some(s) = self.types.read().get(cache_type) {
            return s.clone();
        }
        self.types.write().entry(cache_type.to_string()).or_default().clone()
    }

    /// Counters for one type; unknown types read as all zeros.
    pub fn snapshot(&self, cache_type: &str) -> CacheStats {
        self.types.read().get(cache_type).map(|s| s.snapshot()).unwrap_or_default()
    }

    /// Sum over every registered type.
    pub fn total(&self) -> CacheStats {
        let mut total = CacheStats::default();
        for s in self.types.read().values() {
            total.merge(&s.snapshot());
        }
        total
    }

    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn hit_rates(&self) -> BTreeMap<String, f64> {
        self.types.read().iter().map(|(k, s)| (k.clone(), s.snapshot().hit_rate())).collect()
    }

    pub fn load_times(&self) -> BTreeMap<String, u64> {
        self.types
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), s.snapshot().total_load_time_micros))
            .collect()
    }

    /// Operator reset for one type.
    pub fn reset(&self, cache_type: &str) {
        if let Some(s) = self.types.read().get(cache_type) {
            s.reset();
        }
        log::info!(target: "tierlite::audit", "stats reset: type={cache_type}");
    }

    pub fn reset_all(&self) {
        for s in self.types.read().values() {
            s.reset();
        }
        log::info!(target: "tierlite::audit", "stats reset: all types");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_and_averages() {
        let s = CacheStats {
            hits: 3,
            misses: 1,
            load_success: 2,
            load_failure: 2,
            total_load_time_micros: 500,
            evictions: 0,
        };
        assert!((s.hit_rate() - 75.0).abs() < 1e-9);
        assert!((s.average_load_time_micros() - 250.0).abs() < 1e-9);
        assert!((s.load_success_rate() - 50.0).abs() < 1e-9);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn reset_keeps_recorder_identity() {
        let agg = StatsAggregator::new();
        let docs = agg.for_type("docs");
        docs.record_hit();
        docs.record_load_success(Duration::from_micros(40));
        agg.reset("docs");
        assert_eq!(agg.snapshot("docs"), CacheStats::default());
        docs.record_miss();
        assert_eq!(agg.snapshot("docs").misses, 1);
        assert!(Arc::ptr_eq(&docs, &agg.for_type("docs")));
    }

    #[test]
    fn total_sums_types() {
        let agg = StatsAggregator::new();
        agg.for_type("a").record_hit();
        agg.for_type("b").record_hit();
        agg.for_type("b").record_evictions(4);
        let total = agg.total();
        assert_eq!(total.hits, 2);
        assert_eq!(total.evictions, 4);
        assert_eq!(agg.types(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(agg.hit_rates().get("a"), Some(&100.0));
        agg.reset_all();
        assert_eq!(agg.total(), CacheStats::default());
    }

    #[test]
    fn unknown_type_reads_zero() {
        assert_eq!(StatsAggregator::new().snapshot("nope"), CacheStats::default());
    }
}
