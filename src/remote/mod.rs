//! Shared remote key/value tier.
//!
//! `RemoteStore` is the client contract every process talks to. Implementations
//! must bound each call by `timeout()` and report network failures and timeouts
//! as `CacheError::RemoteUnavailable`.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryRemoteStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisRemoteStore;

use crate::config::RemoteSettings;
use crate::counter::{OutcomeWindow, WindowCount};
use crate::errors::CacheError;
use std::sync::Arc;
use std::time::Duration;

/// Default per-call timeout for remote round trips.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(200);

pub trait RemoteStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` with a time-to-live, replacing any previous value.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a key was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Executes the windowed increment as one server-side unit: a missing counter is
    /// created with `amount` and an expiry of `window`; an existing one is increased
    /// without touching its expiry. Results below zero are clamped to zero.
    fn incr_window(&self, key: &str, window: Duration, amount: i64)
    -> Result<WindowCount, CacheError>;

    /// Reads a counter without modifying it. `None` when absent or expired.
    fn read_counter(&self, key: &str, window: Duration)
    -> Result<Option<WindowCount>, CacheError>;

    /// Adds to the `requests` and `errors` fields of one outcome window as a single
    /// server-side unit. A missing window is created with an expiry of `window`; both
    /// fields live and expire together.
    fn incr_outcome(
        &self,
        key: &str,
        window: Duration,
        requests: i64,
        errors: i64,
    ) -> Result<OutcomeWindow, CacheError>;

    /// Reads both fields of an outcome window in one round trip. `None` when absent
    /// or expired.
    fn read_outcome(&self, key: &str, window: Duration)
    -> Result<Option<OutcomeWindow>, CacheError>;

    fn timeout(&self) -> Duration;
}

/// Builds the store described by `settings`: redis when a URL is set, otherwise the
/// in-process store.
pub fn connect(settings: &RemoteSettings) -> Result<Arc<dyn RemoteStore>, CacheError> {
    match settings.url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(RedisRemoteStore::open(url, settings.timeout())?)),
        #[cfg(not(feature = "redis"))]
        Some(url) => Err(CacheError::ConfigInvalid(format!(
            "remote.url {url} requires the `redis` feature"
        ))),
        None => Ok(Arc::new(MemoryRemoteStore::with_timeout(settings.timeout()))),
    }
}

/// One cache type's view of the remote store: keys are namespaced as
/// `{prefix}:{cache_type}:{key}`.
#[derive(Clone)]
pub struct RemoteTier {
    store: Arc<dyn RemoteStore>,
    namespace: String,
}

impl RemoteTier {
    pub fn new(store: Arc<dyn RemoteStore>, prefix: &str, cache_type: &str) -> Self {
        Self { store, namespace: format!("{prefix}:{cache_type}") }
    }

    #[must_use]
    pub fn remote_key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.store.get(&self.remote_key(key))
    }

    pub fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.store.set(&self.remote_key(key), value, ttl)
    }

    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.store.delete(&self.remote_key(key))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }
}
