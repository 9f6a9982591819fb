use crate::counter::{OutcomeWindow, WindowCount};
use crate::errors::CacheError;
use crate::remote::{DEFAULT_REMOTE_TIMEOUT, RemoteStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

enum Slot {
    Bytes(Vec<u8>),
    Counter { value: i64, created: Instant },
    Outcome { requests: i64, errors: i64, created: Instant },
}

struct Stored {
    slot: Slot,
    expires_at: Instant,
}

impl Stored {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process stand-in for the shared remote store.
///
/// Every instance sharing an `Arc<MemoryRemoteStore>` sees the same keyspace, which
/// is how tests model several processes. Each command runs under one lock, the way
/// a single-threaded server executes a script. Availability and latency can be
/// injected to exercise the timeout and fail-open paths.
pub struct MemoryRemoteStore {
    data: Mutex<HashMap<String, Stored>>,
    available: AtomicBool,
    latency: RwLock<Duration>,
    timeout: Duration,
    round_trips: AtomicU64,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_REMOTE_TIMEOUT)
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency: RwLock::new(Duration::ZERO),
            timeout,
            round_trips: AtomicU64::new(0),
        }
    }

    /// Simulates the server going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Adds artificial latency to every command. Latency at or beyond the timeout
    /// makes calls fail with `RemoteUnavailable` after the timeout elapses.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Number of commands received so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.lock().values().filter(|s| !s.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn round_trip(&self) -> Result<(), CacheError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::RemoteUnavailable("connection refused".into()));
        }
        let latency = *self.latency.read();
        if latency >= self.timeout {
            std::thread::sleep(self.timeout);
            return Err(CacheError::RemoteUnavailable(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            )));
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        match data.get(key) {
            Some(s) if s.is_expired(now) => {
                data.remove(key);
                Ok(None)
            }
            Some(Stored { slot: Slot::Bytes(v), .. }) => Ok(Some(v.clone())),
            Some(Stored { slot: Slot::Counter { value, .. }, .. }) => {
                Ok(Some(value.to_string().into_bytes()))
            }
            Some(Stored { slot: Slot::Outcome { .. }, .. }) => Err(CacheError::RemoteUnavailable(
                format!("WRONGTYPE key {key} holds an outcome window"),
            )),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.round_trip()?;
        let stored = Stored { slot: Slot::Bytes(value.to_vec()), expires_at: Instant::now() + ttl };
        self.data.lock().insert(key.to_string(), stored);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        Ok(self.data.lock().remove(key).is_some_and(|s| !s.is_expired(now)))
    }

    fn incr_window(
        &self,
        key: &str,
        window: Duration,
        amount: i64,
    ) -> Result<WindowCount, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        let live = data.get(key).is_some_and(|s| !s.is_expired(now));
        if !live {
            data.insert(
                key.to_string(),
                Stored {
                    slot: Slot::Counter { value: amount.max(0), created: now },
                    expires_at: now + window,
                },
            );
            return Ok(WindowCount::new(amount, Duration::ZERO));
        }
        let Some(stored) = data.get_mut(key) else {
            return Ok(WindowCount::new(amount, Duration::ZERO));
        };
        match &mut stored.slot {
            Slot::Counter { value, created } => {
                *value = value.saturating_add(amount).max(0);
                Ok(WindowCount::new(*value, now.saturating_duration_since(*created)))
            }
            Slot::Bytes(_) | Slot::Outcome { .. } => Err(CacheError::RemoteUnavailable(format!(
                "WRONGTYPE key {key} does not hold a counter"
            ))),
        }
    }

    fn read_counter(
        &self,
        key: &str,
        _window: Duration,
    ) -> Result<Option<WindowCount>, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        let data = self.data.lock();
        Ok(match data.get(key) {
            Some(Stored { slot: Slot::Counter { value, created }, expires_at })
                if now < *expires_at =>
            {
                Some(WindowCount::new(*value, now.saturating_duration_since(*created)))
            }
            _ => None,
        })
    }

    fn incr_outcome(
        &self,
        key: &str,
        window: Duration,
        requests: i64,
        errors: i64,
    ) -> Result<OutcomeWindow, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        if !data.get(key).is_some_and(|s| !s.is_expired(now)) {
            data.insert(
                key.to_string(),
                Stored {
                    slot: Slot::Outcome { requests: 0, errors: 0, created: now },
                    expires_at: now + window,
                },
            );
        }
        match data.get_mut(key).map(|s| &mut s.slot) {
            Some(Slot::Outcome { requests: r, errors: e, created }) => {
                *r = r.saturating_add(requests).max(0);
                *e = e.saturating_add(errors).max(0);
                Ok(OutcomeWindow::new(*r, *e, now.saturating_duration_since(*created)))
            }
            _ => Err(CacheError::RemoteUnavailable(format!(
                "WRONGTYPE key {key} does not hold an outcome window"
            ))),
        }
    }

    fn read_outcome(
        &self,
        key: &str,
        _window: Duration,
    ) -> Result<Option<OutcomeWindow>, CacheError> {
        self.round_trip()?;
        let now = Instant::now();
        let data = self.data.lock();
        Ok(match data.get(key) {
            Some(Stored { slot: Slot::Outcome { requests, errors, created }, expires_at })
                if now < *expires_at =>
            {
                Some(OutcomeWindow::new(*requests, *errors, now.saturating_duration_since(*created)))
            }
            _ => None,
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_with_ttl() {
        let store = MemoryRemoteStore::new();
        store.set("k", b"v", Duration::from_millis(40)).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v"[..]));
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.get("k").unwrap().is_none());
        store.set("k", b"v", Duration::from_secs(5)).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn incr_window_creates_then_adds_without_resetting_expiry() {
        let store = MemoryRemoteStore::new();
        let w = Duration::from_millis(80);
        assert_eq!(store.incr_window("c", w, 2).unwrap().count, 2);
        std::thread::sleep(Duration::from_millis(50));
        let second = store.incr_window("c", w, 3).unwrap();
        assert_eq!(second.count, 5);
        assert!(second.window_age >= Duration::from_millis(50));
        // Original expiry still applies: the window rolls over ~80ms after creation.
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.incr_window("c", w, 1).unwrap().count, 1);
    }

    #[test]
    fn incr_window_clamps_negative_results() {
        let store = MemoryRemoteStore::new();
        let w = Duration::from_secs(5);
        store.incr_window("c", w, 1).unwrap();
        assert_eq!(store.incr_window("c", w, -10).unwrap().count, 0);
        assert_eq!(store.incr_window("fresh", w, -3).unwrap().count, 0);
    }

    #[test]
    fn unavailable_and_slow_store_fail_as_remote_unavailable() {
        let store = MemoryRemoteStore::with_timeout(Duration::from_millis(20));
        store.set_available(false);
        assert!(store.get("k").unwrap_err().is_remote_unavailable());
        store.set_available(true);
        store.set_latency(Duration::from_millis(50));
        let started = Instant::now();
        assert!(store.incr_window("c", Duration::from_secs(1), 1).unwrap_err().is_remote_unavailable());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn outcome_fields_share_one_expiry() {
        let store = MemoryRemoteStore::new();
        let w = Duration::from_millis(80);
        assert_eq!(store.incr_outcome("o", w, 1, 0).unwrap().requests, 1);
        std::thread::sleep(Duration::from_millis(50));
        let second = store.incr_outcome("o", w, 1, 1).unwrap();
        assert_eq!((second.requests, second.errors), (2, 1));
        std::thread::sleep(Duration::from_millis(40));
        // the first error does not restart the window
        assert!(store.read_outcome("o", w).unwrap().is_none());
        let fresh = store.incr_outcome("o", w, 1, 0).unwrap();
        assert_eq!((fresh.requests, fresh.errors), (1, 0));
    }

    #[test]
    fn outcome_and_counter_slots_do_not_mix() {
        let store = MemoryRemoteStore::new();
        let w = Duration::from_secs(5);
        store.incr_window("c", w, 1).unwrap();
        assert!(store.incr_outcome("c", w, 1, 0).is_err());
        store.incr_outcome("o", w, 1, 1).unwrap();
        assert!(store.incr_window("o", w, 1).is_err());
        assert!(store.read_counter("o", w).unwrap().is_none());
        assert!(store.read_outcome("c", w).unwrap().is_none());
    }

    #[test]
    fn read_counter_ignores_plain_values() {
        let store = MemoryRemoteStore::new();
        store.set("plain", b"x", Duration::from_secs(5)).unwrap();
        assert!(store.read_counter("plain", Duration::from_secs(5)).unwrap().is_none());
        assert!(store.read_counter("missing", Duration::from_secs(5)).unwrap().is_none());
    }
}
