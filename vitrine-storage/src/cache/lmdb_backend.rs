//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached records and search
//! pages survive a process restart and can be shared by several workers on
//! one host.
//!
//! # Layout
//!
//! Three named databases live in one environment:
//! - `entries`: key -> `[expires_ms: i64][version: u64][tag_len: u16][tag][payload]`
//! - `tags`: tag -> current version (`u64`, little endian), plus the
//!   store-wide version clock under `\0clock`
//! - `members`: `tag \0 key` -> empty, used to find entries on flush
//!
//! A flush advances the clock and deletes the tag; a tag whose last member
//! leaves is deleted too. A missing tag reads as the clock, so versions
//! never move backwards and `tags` only holds tags with live members.
//!
//! Version checks and member bookkeeping happen inside one write
//! transaction, so a flush and a concurrent populate are serialized by LMDB.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use vitrine_core::{CacheError, VitrineError, VitrineResult};

use super::traits::{CacheStats, CacheStore, TagStamp};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the entry layout.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for VitrineError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Corrupt(reason) => CacheError::Serialization { reason }.into(),
            other => CacheError::Backend {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

// ============================================================================
// ENTRY ENCODING
// ============================================================================

const HEADER_LEN: usize = 8 + 8 + 2;

#[derive(Debug, PartialEq)]
struct StoredEntry {
    expires_ms: i64,
    stamp: Option<TagStamp>,
    payload: Vec<u8>,
}

impl StoredEntry {
    fn encode(&self) -> Result<Vec<u8>, LmdbCacheError> {
        let (tag, version) = match &self.stamp {
            Some(stamp) => (stamp.tag.as_bytes(), stamp.version),
            None => (&[][..], 0),
        };
        let tag_len = u16::try_from(tag.len())
            .map_err(|_| LmdbCacheError::Corrupt(format!("tag too long: {} bytes", tag.len())))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + tag.len() + self.payload.len());
        bytes.extend_from_slice(&self.expires_ms.to_le_bytes());
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&tag_len.to_le_bytes());
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry shorter than header: {} bytes",
                bytes.len()
            )));
        }
        let expires_ms = i64::from_le_bytes(fixed(&bytes[0..8])?);
        let version = u64::from_le_bytes(fixed(&bytes[8..16])?);
        let tag_len = u16::from_le_bytes(fixed(&bytes[16..18])?) as usize;
        let tag_end = HEADER_LEN + tag_len;
        if bytes.len() < tag_end {
            return Err(LmdbCacheError::Corrupt("tag exceeds entry".to_string()));
        }
        let stamp = if tag_len == 0 {
            None
        } else {
            let tag = std::str::from_utf8(&bytes[HEADER_LEN..tag_end])
                .map_err(|e| LmdbCacheError::Corrupt(e.to_string()))?;
            Some(TagStamp::new(tag, version))
        };
        Ok(Self {
            expires_ms,
            stamp,
            payload: bytes[tag_end..].to_vec(),
        })
    }
}

fn fixed<const N: usize>(slice: &[u8]) -> Result<[u8; N], LmdbCacheError> {
    slice
        .try_into()
        .map_err(|_| LmdbCacheError::Corrupt("truncated header".to_string()))
}

/// Key of the version clock in the `tags` database. Tags never start with
/// a NUL byte.
const CLOCK_KEY: &[u8] = b"\0clock";

fn member_prefix(tag: &str) -> Vec<u8> {
    let mut prefix = tag.as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn member_key(tag: &str, key: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(tag.len() + 1 + key.len());
    bytes.extend_from_slice(tag.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(key.as_bytes());
    bytes
}

// ============================================================================
// STORE
// ============================================================================

/// LMDB-backed cache store.
pub struct LmdbCacheStore {
    env: Env,
    entries: Database<Bytes, Bytes>,
    tags: Database<Bytes, Bytes>,
    members: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    flushes: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbCacheStore {
    /// Open (or create) a cache store under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment and its databases cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let entries = env
            .create_database(&mut wtxn, Some("entries"))
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        let tags = env
            .create_database(&mut wtxn, Some("tags"))
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        let members = env
            .create_database(&mut wtxn, Some("members"))
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            entries,
            tags,
            members,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    fn read_clock(&self, txn: &RoTxn) -> Result<u64, LmdbCacheError> {
        match self.tags.get(txn, CLOCK_KEY).map_err(txn_err)? {
            Some(bytes) => Ok(u64::from_le_bytes(fixed(bytes)?)),
            None => Ok(0),
        }
    }

    fn read_version(&self, txn: &RoTxn, tag: &str) -> Result<u64, LmdbCacheError> {
        match self.tags.get(txn, tag.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Ok(u64::from_le_bytes(fixed(bytes)?)),
            None => self.read_clock(txn),
        }
    }

    fn is_live(&self, txn: &RoTxn, entry: &StoredEntry, now_ms: i64) -> Result<bool, LmdbCacheError> {
        if entry.expires_ms <= now_ms {
            return Ok(false);
        }
        match &entry.stamp {
            Some(stamp) => Ok(self.read_version(txn, &stamp.tag)? == stamp.version),
            None => Ok(true),
        }
    }

    /// Remove an entry and its tag membership inside `wtxn`.
    fn remove_in(&self, wtxn: &mut RwTxn, key: &str) -> Result<bool, LmdbCacheError> {
        let previous = match self.entries.get(wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => StoredEntry::decode(bytes).ok(),
            None => return Ok(false),
        };
        if let Some(stamp) = previous.and_then(|e| e.stamp) {
            self.members
                .delete(wtxn, &member_key(&stamp.tag, key))
                .map_err(txn_err)?;
            let prefix = member_prefix(&stamp.tag);
            let emptied = self
                .members
                .prefix_iter(wtxn, &prefix[..])
                .map_err(txn_err)?
                .next()
                .is_none();
            if emptied {
                self.tags
                    .delete(wtxn, stamp.tag.as_bytes())
                    .map_err(txn_err)?;
            }
        }
        self.entries.delete(wtxn, key.as_bytes()).map_err(txn_err)
    }

    fn evict(&self, key: &str) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let now_ms = Utc::now().timestamp_millis();
        // Re-check under the write lock; a writer may have replaced the entry.
        let still_stale = match self.entries.get(&wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => match StoredEntry::decode(bytes) {
                Ok(entry) => !self.is_live(&wtxn, &entry, now_ms)?,
                Err(_) => true,
            },
            None => false,
        };
        if still_stale && self.remove_in(&mut wtxn, key)? {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        wtxn.commit().map_err(txn_err)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &str) -> VitrineResult<Option<Vec<u8>>> {
        let now_ms = Utc::now().timestamp_millis();
        let lookup = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.entries.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                None => None,
                Some(bytes) => {
                    let entry = StoredEntry::decode(bytes);
                    match entry {
                        Ok(entry) if self.is_live(&rtxn, &entry, now_ms)? => Some(Some(entry.payload)),
                        _ => Some(None),
                    }
                }
            }
        };

        match lookup {
            Some(Some(payload)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(payload))
            }
            Some(None) => {
                self.evict(key)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        stamp: Option<TagStamp>,
    ) -> VitrineResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = StoredEntry {
            expires_ms: Utc::now().timestamp_millis().saturating_add(ttl_ms),
            stamp,
            payload: value,
        };
        let encoded = entry.encode()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        // Read the version before dropping the old entry, which may delete
        // the tag.
        let current = match &entry.stamp {
            Some(stamp) => Some(self.read_version(&wtxn, &stamp.tag)?),
            None => None,
        };
        self.remove_in(&mut wtxn, key)?;
        if let (Some(stamp), Some(current)) = (&entry.stamp, current) {
            if current != stamp.version {
                // Born stale; the tag was flushed after the writer read it.
                wtxn.commit().map_err(txn_err)?;
                return Ok(());
            }
            self.tags
                .put(&mut wtxn, stamp.tag.as_bytes(), &current.to_le_bytes())
                .map_err(txn_err)?;
            self.members
                .put(&mut wtxn, &member_key(&stamp.tag, key), &[])
                .map_err(txn_err)?;
        }
        self.entries
            .put(&mut wtxn, key.as_bytes(), &encoded)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> VitrineResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = self.remove_in(&mut wtxn, key)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    async fn tag_version(&self, tag: &str) -> VitrineResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read_version(&rtxn, tag)?)
    }

    async fn flush_tag(&self, tag: &str) -> VitrineResult<u64> {
        let prefix = member_prefix(tag);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let next = self.read_clock(&wtxn)? + 1;
        self.tags
            .put(&mut wtxn, CLOCK_KEY, &next.to_le_bytes())
            .map_err(txn_err)?;
        self.tags.delete(&mut wtxn, tag.as_bytes()).map_err(txn_err)?;

        let member_keys: Vec<Vec<u8>> = {
            let iter = self.members.prefix_iter(&wtxn, &prefix[..]).map_err(txn_err)?;
            let mut keys = Vec::new();
            for item in iter {
                let (member, _) = item.map_err(txn_err)?;
                keys.push(member.to_vec());
            }
            keys
        };

        let mut removed = 0u64;
        for member in &member_keys {
            self.members.delete(&mut wtxn, member).map_err(txn_err)?;
            if self
                .entries
                .delete(&mut wtxn, &member[prefix.len()..])
                .map_err(txn_err)?
            {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> VitrineResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.entries.len(&rtxn).map_err(txn_err)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            flushes: self.flushes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn open() -> (TempDir, LmdbCacheStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = LmdbCacheStore::new(dir.path(), 16).expect("open lmdb");
        (dir, store)
    }

    #[test]
    fn test_entry_layout() {
        let entry = StoredEntry {
            expires_ms: 1_700_000_000_000,
            stamp: Some(TagStamp::new("products_search", 7)),
            payload: b"{\"total\":0}".to_vec(),
        };
        let bytes = entry.encode().expect("encode");
        assert_eq!(bytes.len(), HEADER_LEN + "products_search".len() + 11);
        assert_eq!(StoredEntry::decode(&bytes).expect("decode"), entry);

        assert!(StoredEntry::decode(&bytes[..4]).is_err());
    }

    #[tokio::test]
    async fn test_put_get_delete() -> VitrineResult<()> {
        let (_dir, store) = open();
        store.put("record:1", b"v".to_vec(), TTL, None).await?;
        assert_eq!(store.get("record:1").await?, Some(b"v".to_vec()));
        assert!(store.delete("record:1").await?);
        assert_eq!(store.get("record:1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_tag() -> VitrineResult<()> {
        let (_dir, store) = open();
        let version = store.tag_version("search").await?;
        assert_eq!(version, 0);
        store
            .put("search:a", b"1".to_vec(), TTL, Some(TagStamp::new("search", version)))
            .await?;
        store
            .put("search:b", b"2".to_vec(), TTL, Some(TagStamp::new("search", version)))
            .await?;
        store.put("record:1", b"3".to_vec(), TTL, None).await?;

        assert_eq!(store.flush_tag("search").await?, 2);
        assert_eq!(store.tag_version("search").await?, 1);
        assert_eq!(store.get("search:a").await?, None);
        assert_eq!(store.get("record:1").await?, Some(b"3".to_vec()));
        assert_eq!(store.stats().await?.entry_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_outdated_stamp_is_never_stored() -> VitrineResult<()> {
        let (_dir, store) = open();
        let observed = store.tag_version("search").await?;
        store.flush_tag("search").await?;
        store
            .put("search:a", b"old".to_vec(), TTL, Some(TagStamp::new("search", observed)))
            .await?;
        assert_eq!(store.get("search:a").await?, None);
        assert_eq!(store.stats().await?.entry_count, 0);
        Ok(())
    }

    fn stored_tag_count(store: &LmdbCacheStore) -> usize {
        let rtxn = store.env.read_txn().expect("read txn");
        store
            .tags
            .iter(&rtxn)
            .expect("tags iter")
            .filter_map(Result::ok)
            .filter(|(key, _)| *key != CLOCK_KEY)
            .count()
    }

    #[tokio::test]
    async fn test_flushed_and_emptied_tags_are_deleted() -> VitrineResult<()> {
        let (_dir, store) = open();
        for id in 1..=3 {
            let tag = format!("record:{id}");
            let version = store.tag_version(&tag).await?;
            store
                .put(&tag, b"doc".to_vec(), TTL, Some(TagStamp::new(tag.clone(), version)))
                .await?;
        }
        assert_eq!(stored_tag_count(&store), 3);

        store.flush_tag("record:1").await?;
        store.delete("record:2").await?;
        assert_eq!(stored_tag_count(&store), 1);

        // A deleted tag still rejects stamps taken before its flush.
        assert_eq!(store.tag_version("record:1").await?, 1);
        store
            .put("record:1", b"old".to_vec(), TTL, Some(TagStamp::new("record:1", 0)))
            .await?;
        assert_eq!(store.get("record:1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_entries_expire() -> VitrineResult<()> {
        let (_dir, store) = open();
        store
            .put("k", b"v".to_vec(), Duration::from_millis(5), None)
            .await?;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await?, None);
        assert_eq!(store.stats().await?.evictions, 1);
        Ok(())
    }
}
