//! Two-tier read-through/write-through cache with shared-counter rate limiting and
//! error-rate based degradation.
//!
//! A `CacheEngine` serves one cache type from a bounded in-process `LocalTier` backed
//! by a shared `RemoteStore`. `RateLimiter` and `DegradeController` keep their
//! windows in the remote store through `AtomicWindowCounter`, so limits hold across
//! every process pointed at the same store.

pub mod cli;
pub mod config;
pub mod counter;
pub mod degrade;
pub mod engine;
pub mod errors;
pub mod local;
pub mod logger;
pub mod offload;
pub mod ratelimit;
pub mod registry;
pub mod remote;
pub mod stats;
pub mod utils;

pub use config::TierliteConfig;
pub use counter::{AtomicWindowCounter, WindowCount};
pub use degrade::{DegradeConfig, DegradeController, DegradeStats};
pub use engine::{CacheConfig, CacheEngine, CacheManager, EngineOptions};
pub use errors::CacheError;
pub use local::{LocalTier, LocalTierConfig, OverflowPolicy};
pub use offload::AsyncCache;
pub use ratelimit::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use remote::{MemoryRemoteStore, RemoteStore, RemoteTier};
pub use stats::{CacheStats, StatsAggregator};

/// Configures logging from `TIERLITE_LOG_*` environment variables.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::configure_from_env()?;
    Ok(())
}
