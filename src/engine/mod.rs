//! The multi-level cache: a `LocalTier` in front of a shared `RemoteTier`.

mod cache;
mod config;
mod manager;

pub use cache::{CacheEngine, EngineOptions};
pub use config::CacheConfig;
pub use manager::CacheManager;
