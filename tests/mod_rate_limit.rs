use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tierlite::counter::AtomicWindowCounter;
use tierlite::ratelimit::{RateLimitConfig, RateLimiter};
use tierlite::remote::MemoryRemoteStore;

fn limiter_with(store: &Arc<MemoryRemoteStore>, permits_per_second: u64, burst_size: u64) -> RateLimiter {
    let l = RateLimiter::new(AtomicWindowCounter::new(store.clone()), "tierlite");
    l.update_config("api", RateLimitConfig { permits_per_second, burst_size, enabled: true }).unwrap();
    l
}

#[test]
fn test_burst_allows_exactly_the_limit() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 5, 5);
    let results: Vec<bool> = (0..11).map(|_| l.try_acquire("api", 1)).collect();
    assert_eq!(results.iter().filter(|ok| **ok).count(), 10);
    assert!(results[..10].iter().all(|ok| *ok));
    assert!(!results[10]);
    let stats = l.stats("api");
    assert_eq!((stats.requests, stats.rejections), (11, 1));
    assert!((stats.reject_rate() - 100.0 / 11.0).abs() < 1e-9);
}

#[test]
fn test_limit_is_shared_across_instances() {
    let store = Arc::new(MemoryRemoteStore::new());
    let a = limiter_with(&store, 5, 0);
    let b = limiter_with(&store, 5, 0);
    let mut allowed = 0;
    for i in 0..10 {
        let l = if i % 2 == 0 { &a } else { &b };
        if l.try_acquire("api", 1) {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

#[test]
fn test_concurrent_callers_never_exceed_the_limit() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = Arc::new(limiter_with(&store, 40, 10));
    let allowed = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let l = l.clone();
            let allowed = allowed.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    if l.try_acquire("api", 1) {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    // 160 calls land well inside one window
    assert_eq!(allowed.load(Ordering::Relaxed), 50);
}

#[test]
fn test_new_window_restores_capacity() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 2, 0);
    assert!(l.try_acquire("api", 2));
    assert!(!l.try_acquire("api", 1));
    thread::sleep(Duration::from_millis(1100));
    assert!(l.try_acquire("api", 1));
}

#[test]
fn test_key_classes_are_independent() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 1, 0);
    assert!(l.try_acquire("api", 1));
    assert!(!l.try_acquire("api", 1));
    // "batch" uses the default config
    assert!(l.try_acquire("batch", 1));
    assert_eq!(l.get_config("batch"), RateLimitConfig::default());
}

#[test]
fn test_zero_permits_is_always_allowed() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 1, 0);
    let before = store.round_trips();
    assert!(l.try_acquire("api", 0));
    assert_eq!(store.round_trips(), before);
}

#[test]
fn test_config_update_applies_to_next_call() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 1, 0);
    assert!(l.try_acquire("api", 1));
    assert!(!l.try_acquire("api", 1));
    l.update_config("api", RateLimitConfig { permits_per_second: 10, burst_size: 0, enabled: true })
        .unwrap();
    assert!(l.try_acquire("api", 1));
}

#[test]
fn test_unreachable_store_fails_open() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 1, 0);
    store.set_available(false);
    for _ in 0..5 {
        assert!(l.try_acquire("api", 1));
    }
    assert_eq!(l.stats("api").remote_failures, 5);
}

#[test]
fn test_eleventh_call_is_denied_without_burst() {
    let store = Arc::new(MemoryRemoteStore::new());
    let l = limiter_with(&store, 10, 0);
    let allowed = (0..11).filter(|_| l.try_acquire("api", 1)).count();
    assert_eq!(allowed, 10);
}
