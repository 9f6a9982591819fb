//! Per key-class configuration with a shared default.
//!
//! Lookups clone the current value on every call, so updates are visible to the
//! next check without any caching of config in the limiter or degrade paths.

use crate::errors::CacheError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;

/// Range checks applied before a config replaces the current one.
pub trait Validate {
    fn validate(&self) -> Result<(), CacheError>;
}

pub struct ConfigRegistry<T> {
    kind: &'static str,
    default: RwLock<T>,
    overrides: RwLock<HashMap<String, T>>,
}

impl<T: Clone + Debug + Validate> ConfigRegistry<T> {
    pub fn new(kind: &'static str, default: T) -> Self {
        Self { kind, default: RwLock::new(default), overrides: RwLock::new(HashMap::new()) }
    }

    /// The override for `key_class`, or the default.
    pub fn get(&self, key_class: &str) -> T {
        if let Some(cfg) = self.overrides.read().get(key_class) {
            return cfg.clone();
        }
        self.default.read().clone()
    }

    pub fn default_config(&self) -> T {
        self.default.read().clone()
    }

    /// Installs an override. Invalid configs are rejected and the previous one stays.
    pub fn update(&self, key_class: &str, config: T) -> Result<(), CacheError> {
        if let Err(e) = config.validate() {
            log::warn!(
                target: "tierlite::audit",
                "{} config rejected: key_class={key_class} config={config:?} error={e}",
                self.kind
            );
            return Err(e);
        }
        log::info!(
            target: "tierlite::audit",
            "{} config updated: key_class={key_class} config={config:?}",
            self.kind
        );
        self.overrides.write().insert(key_class.to_string(), config);
        Ok(())
    }

    pub fn set_default(&self, config: T) -> Result<(), CacheError> {
        config.validate()?;
        log::info!(target: "tierlite::audit", "{} default updated: {config:?}", self.kind);
        *self.default.write() = config;
        Ok(())
    }

    /// Drops the override for `key_class`. Returns whether one existed.
    pub fn reset(&self, key_class: &str) -> bool {
        let existed = self.overrides.write().remove(key_class).is_some();
        log::info!(target: "tierlite::audit", "{} config reset: key_class={key_class}", self.kind);
        existed
    }

    pub fn key_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.overrides.read().keys().cloned().collect();
        names.sort();
        names
    }
}
