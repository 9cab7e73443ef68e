//! Cache store trait and tag stamps.
//!
//! A cache store is a byte-level key/value store with per-entry TTL and
//! versioned tag groups. Flushing a tag bumps its version; an entry stamped
//! with an older version of its tag is never returned again, even if the
//! physical delete of that entry was missed.

use std::time::Duration;

use async_trait::async_trait;
use vitrine_core::VitrineResult;

/// Tag membership recorded on an entry at write time.
///
/// `version` is the tag version the writer observed *before* loading the
/// value from its origin. If the tag is flushed while the origin load is in
/// flight, the stamp is already outdated when the entry lands and the entry
/// is treated as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagStamp {
    pub tag: String,
    pub version: u64,
}

impl TagStamp {
    pub fn new(tag: impl Into<String>, version: u64) -> Self {
        Self {
            tag: tag.into(),
            version,
        }
    }
}

/// Cache store trait for pluggable cache implementations.
///
/// Implementations must be safe for concurrent use; tag versions must be
/// monotonically increasing for the lifetime of the store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live entry. Expired entries and entries with an outdated tag
    /// stamp are reported as misses.
    async fn get(&self, key: &str) -> VitrineResult<Option<Vec<u8>>>;

    /// Store an entry with a TTL and an optional tag stamp.
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        stamp: Option<TagStamp>,
    ) -> VitrineResult<()>;

    /// Delete a single entry. Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> VitrineResult<bool>;

    /// Current version of a tag. Starts at 0, only grows, and always
    /// changes when the tag is flushed.
    async fn tag_version(&self, tag: &str) -> VitrineResult<u64>;

    /// Invalidate every entry under `tag`. Returns the number of entries
    /// physically removed.
    async fn flush_tag(&self, tag: &str) -> VitrineResult<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> VitrineResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent, expired or outdated entries).
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of tag flushes performed.
    pub flushes: u64,
    /// Entries dropped because their TTL elapsed or their stamp was outdated.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
