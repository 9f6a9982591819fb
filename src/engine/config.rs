use crate::errors::CacheError;
use crate::registry::Validate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per cache-type settings. Engines read an immutable snapshot per operation;
/// updates swap the whole snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_local_size: usize,
    pub local_ttl_secs: u64,
    pub remote_ttl_secs: u64,
    pub local_enabled: bool,
    pub remote_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_local_size: 1000,
            local_ttl_secs: 300,
            remote_ttl_secs: 3600,
            local_enabled: true,
            remote_enabled: true,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    #[must_use]
    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_ttl_secs)
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> Result<(), CacheError> {
        if !self.local_enabled && !self.remote_enabled {
            return Err(CacheError::ConfigInvalid("at least one tier must be enabled".into()));
        }
        if self.local_enabled && self.max_local_size == 0 {
            return Err(CacheError::ConfigInvalid("max_local_size must be at least 1".into()));
        }
        if self.local_enabled && self.local_ttl_secs == 0 {
            return Err(CacheError::ConfigInvalid("local_ttl_secs must be at least 1".into()));
        }
        if self.remote_enabled && self.remote_ttl_secs == 0 {
            return Err(CacheError::ConfigInvalid("remote_ttl_secs must be at least 1".into()));
        }
        Ok(())
    }
}
