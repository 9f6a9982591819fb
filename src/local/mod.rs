mod config;
mod store;
mod entry;
mod metrics;
mod policy;

pub use config::{LocalTierConfig, OverflowPolicy};
pub use store::{InsertOutcome, LocalTier};
pub use entry::CacheEntry;
pub use metrics::{LocalTierMetrics, LocalTierMetricsSnapshot};
