//! In-process cache store.
//!
//! Tag versions come from one store-wide clock. A flush advances the clock
//! and forgets the tag; a tag whose last member leaves is forgotten too. An
//! unknown tag reads as the current clock, so versions never move backwards
//! and the tag map only holds tags with live members.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use vitrine_core::{CacheError, VitrineResult};

use super::traits::{CacheStats, CacheStore, TagStamp};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
    stamp: Option<TagStamp>,
}

#[derive(Debug, Default)]
struct TagState {
    version: u64,
    members: HashSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tags: HashMap<String, TagState>,
    clock: u64,
}

impl Inner {
    fn version_of(&self, tag: &str) -> u64 {
        self.tags.get(tag).map(|t| t.version).unwrap_or(self.clock)
    }

    fn is_current(&self, stamp: &Option<TagStamp>) -> bool {
        match stamp {
            None => true,
            Some(stamp) => stamp.version == self.version_of(&stamp.tag),
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(stamp) = entry.stamp {
                    let emptied = match self.tags.get_mut(&stamp.tag) {
                        Some(tag) => {
                            tag.members.remove(key);
                            tag.members.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        self.tags.remove(&stamp.tag);
                    }
                }
                true
            }
            None => false,
        }
    }
}

/// Cache store held in process memory. Cloning shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    inner: Arc<RwLock<Inner>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    flushes: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn tracked_tags(&self) -> usize {
        self.inner.read().map(|inner| inner.tags.len()).unwrap_or(0)
    }

    fn poisoned() -> CacheError {
        CacheError::Backend {
            reason: "cache lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> VitrineResult<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let inner = self.inner.read().map_err(|_| Self::poisoned())?;
            match inner.entries.get(key) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                Some(entry) if entry.expires_at > now && inner.is_current(&entry.stamp) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired or outdated: drop it under the write lock.
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let stale = inner
            .entries
            .get(key)
            .map(|e| e.expires_at <= now || !inner.is_current(&e.stamp))
            .unwrap_or(false);
        if stale && inner.remove_entry(key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        stamp: Option<TagStamp>,
    ) -> VitrineResult<()> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        // Read the version before dropping the old entry, which may forget
        // the tag.
        let current = stamp.as_ref().map(|stamp| inner.version_of(&stamp.tag));
        inner.remove_entry(key);
        if let (Some(stamp), Some(current)) = (&stamp, current) {
            if stamp.version != current {
                // Born stale; a flush happened after the writer read the version.
                return Ok(());
            }
            inner
                .tags
                .entry(stamp.tag.clone())
                .or_insert_with(|| TagState {
                    version: current,
                    members: HashSet::new(),
                })
                .members
                .insert(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                stamp,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> VitrineResult<bool> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        Ok(inner.remove_entry(key))
    }

    async fn tag_version(&self, tag: &str) -> VitrineResult<u64> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.version_of(tag))
    }

    async fn flush_tag(&self, tag: &str) -> VitrineResult<u64> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        inner.clock += 1;
        let members = inner.tags.remove(tag).map(|t| t.members).unwrap_or_default();
        let mut removed = 0u64;
        for key in members {
            if inner.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> VitrineResult<CacheStats> {
        let entry_count = self
            .inner
            .read()
            .map(|inner| inner.entries.len() as u64)
            .map_err(|_| Self::poisoned())?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            flushes: self.flushes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}
