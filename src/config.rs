use std::time::Duration;

/// How long a loaded mirror is trusted before `load` goes back to storage.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub cache_ttl: Duration,
}

impl StoreConfig {
    pub fn with_cache_ttl_secs(secs: u64) -> Self {
        Self {
            cache_ttl: Duration::from_secs(secs),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}
