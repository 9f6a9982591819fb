use crate::local::store::Inner;
use crate::utils::num::usize_to_u64;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// Removes expired entries from every shard, one shard lock at a time. Returns number evicted.
pub(crate) fn purge_expired(inner: &Inner) -> usize {
    let now = Instant::now();
    let mut count = 0usize;
    for shard in &inner.shards {
        let mut guard = shard.lock();
        let expired: Vec<String> =
            guard.iter().filter(|(_, e)| e.is_expired_at(now)).map(|(k, _)| k.clone()).collect();
        for key in &expired {
            guard.pop(key.as_str());
        }
        drop(guard);
        inner.len.fetch_sub(expired.len(), Ordering::Relaxed);
        count += expired.len();
    }
    if count > 0 {
        let n = usize_to_u64(count);
        inner.metrics.ttl_evictions.fetch_add(n, Ordering::Relaxed);
        if let Some(stats) = &inner.stats {
            stats.record_evictions(n);
        }
        crate::dev6!("{{\"bench\":\"local\",\"op\":\"ttl_purge\",\"evicted\":{}}}", count);
    }
    count
}
