use std::sync::atomic::{AtomicU64, Ordering};

/// Simple metrics for observing local tier behavior.
#[derive(Default)]
pub struct LocalTierMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    pub removes: AtomicU64,
    pub ttl_evictions: AtomicU64,
    pub lru_evictions: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub total_get_ns: AtomicU64,
    pub total_insert_ns: AtomicU64,
}

impl LocalTierMetrics {
    pub fn snapshot(&self) -> LocalTierMetricsSnapshot {
        LocalTierMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            ttl_evictions: self.ttl_evictions.load(Ordering::Relaxed),
            lru_evictions: self.lru_evictions.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            total_get_ns: self.total_get_ns.load(Ordering::Relaxed),
            total_insert_ns: self.total_insert_ns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTierMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub removes: u64,
    pub ttl_evictions: u64,
    pub lru_evictions: u64,
    pub capacity_rejections: u64,
    pub total_get_ns: u64,
    pub total_insert_ns: u64,
}
