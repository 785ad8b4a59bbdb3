//! Cache configuration

use std::path::PathBuf;

/// Default minimum time-to-live before an entry becomes evictable: one hour.
pub const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

/// Default maximum combined size of payload plus metadata bytes: 256 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration for a [`StreamCache`](crate::StreamCache) instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for cache storage, created if missing
    pub path: PathBuf,
    /// Minimum age in milliseconds an entry must reach before eviction
    pub ttl_ms: u64,
    /// Maximum combined size in bytes of all stored payload and metadata
    pub max_size: u64,
}

impl CacheConfig {
    /// Create a configuration for the given cache directory with defaults
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl_ms: DEFAULT_TTL_MS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new("/tmp/cache");
        assert_eq!(config.path, PathBuf::from("/tmp/cache"));
        assert_eq!(config.ttl_ms, 3_600_000);
        assert_eq!(config.max_size, 256 * 1024 * 1024);
    }

    #[test]
    fn test_builder_overrides() {
        let config = CacheConfig::new("/tmp/cache")
            .with_ttl_ms(0)
            .with_max_size(1024);
        assert_eq!(config.ttl_ms, 0);
        assert_eq!(config.max_size, 1024);
    }
}
