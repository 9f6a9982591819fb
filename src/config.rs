//! TOML configuration for a tierlite process.
//!
//! Lookup order for the file: an explicit path, then `TIERLITE_CONFIG`, then
//! `./tierlite.toml`. With none present the built-in defaults apply. Within the
//! `cache`, `rate_limit` and `degrade` tables the entry named `default` becomes the
//! default for every type or key-class without its own entry.

use crate::degrade::DegradeConfig;
use crate::engine::CacheConfig;
use crate::errors::CacheError;
use crate::local::LocalTierConfig;
use crate::ratelimit::RateLimitConfig;
use crate::registry::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "TIERLITE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "tierlite.toml";
pub const DEFAULT_SECTION: &str = "default";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub timeout_ms: u64,
    /// `redis://` URL. Without it the in-process store is used.
    pub url: Option<String>,
    pub key_prefix: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self { timeout_ms: 200, url: None, key_prefix: "tierlite".to_string() }
    }
}

impl RemoteSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<usize>,
    pub dev6: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierliteConfig {
    pub remote: RemoteSettings,
    pub local: LocalTierConfig,
    pub logging: LoggingSettings,
    pub cache: BTreeMap<String, CacheConfig>,
    pub rate_limit: BTreeMap<String, RateLimitConfig>,
    pub degrade: BTreeMap<String, DegradeConfig>,
}

impl TierliteConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, CacheError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_file(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Resolves the config file by precedence and loads it.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CacheError> {
        match Self::resolve_path(explicit) {
            Some(path) => {
                log::info!(target: "tierlite::config", "loading config from {}", path.display());
                Self::load_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Ok(p) = std::env::var(CONFIG_ENV)
            && !p.trim().is_empty()
        {
            return Some(PathBuf::from(p));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.remote.timeout_ms == 0 {
            return Err(CacheError::ConfigInvalid("remote.timeout_ms must be at least 1".into()));
        }
        if self.remote.key_prefix.is_empty() {
            return Err(CacheError::ConfigInvalid("remote.key_prefix must not be empty".into()));
        }
        if self.local.shards == 0 || self.local.purge_interval_secs == 0 {
            return Err(CacheError::ConfigInvalid(
                "local.shards and local.purge_interval_secs must be at least 1".into(),
            ));
        }
        check_table("cache", &self.cache)?;
        check_table("rate_limit", &self.rate_limit)?;
        check_table("degrade", &self.degrade)
    }

    /// Config for `cache_type`: its own section, then `[cache.default]`, then defaults.
    #[must_use]
    pub fn cache_config(&self, cache_type: &str) -> CacheConfig {
        section(&self.cache, cache_type)
    }

    #[must_use]
    pub fn default_rate_limit(&self) -> RateLimitConfig {
        section(&self.rate_limit, DEFAULT_SECTION)
    }

    #[must_use]
    pub fn default_degrade(&self) -> DegradeConfig {
        section(&self.degrade, DEFAULT_SECTION)
    }
}

fn section<T: Clone + Default>(table: &BTreeMap<String, T>, name: &str) -> T {
    table.get(name).or_else(|| table.get(DEFAULT_SECTION)).cloned().unwrap_or_default()
}

fn check_table<T: Validate>(kind: &str, table: &BTreeMap<String, T>) -> Result<(), CacheError> {
    for (name, cfg) in table {
        cfg.validate()
            .map_err(|e| CacheError::ConfigInvalid(format!("[{kind}.{name}]: {e}")))?;
    }
    Ok(())
}
