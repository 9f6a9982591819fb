//! Race-free windowed counters kept in the remote store.
//!
//! A counter key holds one fixed window at a time. The window opens on the first
//! increment and disappears when the remote key expires; stale windows are never
//! read back, only replaced by the next first increment.

use crate::errors::CacheError;
use crate::remote::RemoteStore;
use crate::utils::num::i64_to_u64_saturating_nonnegative;
use std::sync::Arc;
use std::time::Duration;

/// Result of a counter read or increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// How long the current window has been open.
    pub window_age: Duration,
}

impl WindowCount {
    #[must_use]
    pub fn new(count: i64, window_age: Duration) -> Self {
        Self { count: i64_to_u64_saturating_nonnegative(count), window_age }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { count: 0, window_age: Duration::ZERO }
    }
}

/// Request and error counts that share one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeWindow {
    pub requests: u64,
    pub errors: u64,
    pub window_age: Duration,
}

impl OutcomeWindow {
    #[must_use]
    pub fn new(requests: i64, errors: i64, window_age: Duration) -> Self {
        Self {
            requests: i64_to_u64_saturating_nonnegative(requests),
            errors: i64_to_u64_saturating_nonnegative(errors),
            window_age,
        }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { requests: 0, errors: 0, window_age: Duration::ZERO }
    }
}

#[derive(Clone)]
pub struct AtomicWindowCounter {
    store: Arc<dyn RemoteStore>,
}

impl AtomicWindowCounter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Adds `amount` to the window for `counter_key` in a single remote round trip and
    /// returns the new count. A missing window is created with an expiry of
    /// `window_secs` (minimum 1).
    pub fn increment_and_get(
        &self,
        counter_key: &str,
        window_secs: u64,
        amount: i64,
    ) -> Result<WindowCount, CacheError> {
        let window = Duration::from_secs(window_secs.max(1));
        let result = self.store.incr_window(counter_key, window, amount);
        if let Ok(wc) = &result {
            crate::dev6!(
                "{{\"op\":\"counter_incr\",\"key\":\"{}\",\"count\":{},\"age_ms\":{}}}",
                counter_key,
                wc.count,
                wc.window_age.as_millis()
            );
        }
        result
    }

    /// Reads the current window without incrementing. Absent windows read as zero.
    pub fn current(&self, counter_key: &str, window_secs: u64) -> Result<WindowCount, CacheError> {
        let window = Duration::from_secs(window_secs.max(1));
        Ok(self.store.read_counter(counter_key, window)?.unwrap_or(WindowCount::empty()))
    }

    /// Counts one outcome in the paired window at `outcome_key`: a request always, an
    /// error too when `failed`. Both land in the same round trip and the same window.
    pub fn record_outcome(
        &self,
        outcome_key: &str,
        window_secs: u64,
        failed: bool,
    ) -> Result<OutcomeWindow, CacheError> {
        let window = Duration::from_secs(window_secs.max(1));
        let ow = self.store.incr_outcome(outcome_key, window, 1, i64::from(failed))?;
        crate::dev6!(
            "{{\"op\":\"outcome_incr\",\"key\":\"{}\",\"requests\":{},\"errors\":{}}}",
            outcome_key,
            ow.requests,
            ow.errors
        );
        Ok(ow)
    }

    /// Reads both counts of the paired window at once. Absent windows read as zero.
    pub fn current_outcome(&self, outcome_key: &str, window_secs: u64) -> Result<OutcomeWindow, CacheError> {
        let window = Duration::from_secs(window_secs.max(1));
        Ok(self.store.read_outcome(outcome_key, window)?.unwrap_or(OutcomeWindow::empty()))
    }

    /// Drops the window early. Used by operator resets only.
    pub fn reset(&self, counter_key: &str) -> Result<bool, CacheError> {
        self.store.delete(counter_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    #[test]
    fn increment_is_one_round_trip() {
        let store = Arc::new(MemoryRemoteStore::new());
        let counter = AtomicWindowCounter::new(store.clone());
        let before = store.round_trips();
        let wc = counter.increment_and_get("c", 1, 3).unwrap();
        assert_eq!(wc.count, 3);
        assert_eq!(store.round_trips() - before, 1);
    }

    #[test]
    fn current_reads_zero_for_missing_window() {
        let counter = AtomicWindowCounter::new(Arc::new(MemoryRemoteStore::new()));
        assert_eq!(counter.current("nope", 5).unwrap(), WindowCount::empty());
        counter.increment_and_get("yes", 5, 2).unwrap();
        assert_eq!(counter.current("yes", 5).unwrap().count, 2);
        assert!(counter.reset("yes").unwrap());
        assert_eq!(counter.current("yes", 5).unwrap().count, 0);
    }

    #[test]
    fn zero_window_is_treated_as_one_second() {
        let counter = AtomicWindowCounter::new(Arc::new(MemoryRemoteStore::new()));
        counter.increment_and_get("z", 0, 1).unwrap();
        assert_eq!(counter.increment_and_get("z", 0, 1).unwrap().count, 2);
    }

    #[test]
    fn outcome_is_one_round_trip_each_way() {
        let store = Arc::new(MemoryRemoteStore::new());
        let counter = AtomicWindowCounter::new(store.clone());
        let before = store.round_trips();
        counter.record_outcome("o", 5, false).unwrap();
        let ow = counter.record_outcome("o", 5, true).unwrap();
        assert_eq!((ow.requests, ow.errors), (2, 1));
        let read = counter.current_outcome("o", 5).unwrap();
        assert_eq!((read.requests, read.errors), (2, 1));
        assert_eq!(store.round_trips() - before, 3);
        assert_eq!(counter.current_outcome("none", 5).unwrap(), OutcomeWindow::empty());
    }

    #[test]
    fn unavailable_store_surfaces_error() {
        let store = Arc::new(MemoryRemoteStore::new());
        store.set_available(false);
        let counter = AtomicWindowCounter::new(store);
        assert!(counter.increment_and_get("c", 1, 1).unwrap_err().is_remote_unavailable());
    }
}
