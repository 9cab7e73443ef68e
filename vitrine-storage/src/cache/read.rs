//! Provenance of values returned by the cache coordinator.

use std::fmt;

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Served from a live cache entry.
    Cache,
    /// Loaded from the origin after a miss, then cached.
    Origin,
    /// Loaded from the origin without touching the cache.
    Bypass,
}

impl ReadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadSource::Cache => "hit",
            ReadSource::Origin => "miss",
            ReadSource::Bypass => "bypass",
        }
    }
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a cache-mediated read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    pub value: T,
    pub source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
        }
    }

    pub fn from_origin(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Origin,
        }
    }

    pub fn bypassed(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Bypass,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
