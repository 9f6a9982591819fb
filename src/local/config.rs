use serde::{Deserialize, Serialize};

/// What the local tier does when an insert would exceed `max_size` after expired
/// entries have been swept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip the new entry; live entries are never displaced.
    #[default]
    Reject,
    /// Drop the least recently used entry of the key's shard.
    EvictLru,
}

/// Configuration for the local tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTierConfig {
    pub max_size: usize,
    pub shards: usize,
    pub overflow: OverflowPolicy,
    pub purge_interval_secs: u64,
}

impl Default for LocalTierConfig {
    fn default() -> Self {
        Self { max_size: 1000, shards: 16, overflow: OverflowPolicy::Reject, purge_interval_secs: 5 }
    }
}
