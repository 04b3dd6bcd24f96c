//! Namespace cache: prefix listings with TTL expiry and coarse invalidation.
//!
//! One [`CacheRecord`] is kept per listed prefix. Records are immutable once
//! built and shared as `Arc`s, so a refresh replaces the whole record and a
//! reader holding the old one never sees a partial update. Concurrent
//! writers to the same prefix race last-writer-wins.
//!
//! # Freshness
//!
//! A record is fresh while `now - fetched_at < ttl`. A TTL of zero disables
//! the cache: lookups always miss and writes are discarded.
//!
//! # Invalidation
//!
//! Writing a key drops the record of the key's parent prefix, nothing else.
//! Ancestors stay cached even if the write implicitly created an
//! intermediate directory; their listings refresh when they expire.

mod persist;
mod stats;

pub use persist::{CACHE_FORMAT_VERSION, cache_file_path, default_cache_dir};
pub use stats::CacheStats;

use crate::error::StoreError;
use crate::path;
use crate::store::{FileEntry, Listing, RemoteStore, SortKey, sort_files};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default time-to-live for cached listings (6 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(21_600);

/// Snapshot of one prefix listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Child directory names.
    pub directories: BTreeSet<String>,
    /// Files directly under the prefix.
    pub files: Vec<FileEntry>,
    /// When the listing was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record stamped with the current time.
    pub fn new(directories: impl IntoIterator<Item = String>, files: Vec<FileEntry>) -> Self {
        Self::fetched_at(directories, files, Utc::now())
    }

    pub fn fetched_at(
        directories: impl IntoIterator<Item = String>,
        files: Vec<FileEntry>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            directories: directories.into_iter().collect(),
            files,
            fetched_at,
        }
    }

    /// Whether the record is still within `ttl` at `now`.
    ///
    /// Records stamped in the future (clock skew) count as fresh.
    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if ttl.is_zero() {
            return false;
        }
        match now.signed_duration_since(self.fetched_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => true,
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.is_fresh_at(ttl, Utc::now())
    }

    /// Time since the record was fetched, zero if stamped in the future.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Total size of the files in this record.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// The record as a sorted listing.
    pub fn to_listing(&self, sort: SortKey) -> Listing {
        let mut files = self.files.clone();
        sort_files(&mut files, sort);
        Listing {
            directories: self.directories.iter().cloned().collect(),
            files,
            next_token: None,
        }
    }
}

/// Thread-safe prefix -> listing cache.
///
/// # Example
///
/// ```
/// use bucketfs_core::cache::NamespaceCache;
/// use std::time::Duration;
///
/// let cache = NamespaceCache::new(Duration::from_secs(60));
/// cache.put("a/b/", ["c".to_string()], Vec::new());
/// assert!(cache.get("a/b/").is_some());
///
/// cache.invalidate("a/b/new.txt");
/// assert!(cache.get("a/b/").is_none());
/// ```
#[derive(Debug)]
pub struct NamespaceCache {
    records: DashMap<String, Arc<CacheRecord>>,
    ttl: Duration,
    stats: CacheStats,
}

impl NamespaceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            stats: CacheStats::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Fresh record for `prefix`, if any. A stale record is removed.
    pub fn get(&self, prefix: &str) -> Option<Arc<CacheRecord>> {
        if !self.is_enabled() {
            return None;
        }
        if let Some(record) = self.records.get(prefix) {
            if record.is_fresh(self.ttl) {
                self.stats.record_hit();
                return Some(Arc::clone(record.value()));
            }
            drop(record);
            // Another writer may have refreshed it in the meantime.
            if self
                .records
                .remove_if(prefix, |_, r| !r.is_fresh(self.ttl))
                .is_some()
            {
                self.stats.record_expirations(1);
            }
        }
        self.stats.record_miss();
        None
    }

    /// Replace the record for `prefix` with a freshly stamped one.
    pub fn put(
        &self,
        prefix: &str,
        directories: impl IntoIterator<Item = String>,
        files: Vec<FileEntry>,
    ) -> Arc<CacheRecord> {
        self.insert_record(prefix, CacheRecord::new(directories, files))
    }

    /// Replace the record for `prefix` with the contents of a listing.
    pub fn put_listing(&self, prefix: &str, listing: &Listing) -> Arc<CacheRecord> {
        self.put(
            prefix,
            listing.directories.iter().cloned(),
            listing.files.clone(),
        )
    }

    /// Store a prebuilt record, keeping its timestamp.
    ///
    /// The record is returned either way; it is only retained when the cache
    /// is enabled.
    pub fn insert_record(&self, prefix: &str, record: CacheRecord) -> Arc<CacheRecord> {
        let record = Arc::new(record);
        if self.is_enabled() {
            self.records.insert(prefix.to_string(), Arc::clone(&record));
            self.stats.record_insert();
            trace!(prefix, "cache put");
        }
        record
    }

    /// Drop the record of the prefix containing `key`.
    ///
    /// A key ending in `/` is its own prefix, so `"a/b/"` drops `"a/b/"`.
    /// Returns the prefix that was targeted.
    pub fn invalidate(&self, key: &str) -> String {
        let parent = path::parent_prefix(key).to_string();
        if self.records.remove(&parent).is_some() {
            self.stats.record_invalidation();
        }
        debug!(prefix = %parent, "Cache invalidated");
        parent
    }

    /// Drop the record for exactly `prefix`.
    pub fn remove(&self, prefix: &str) -> bool {
        self.records.remove(prefix).is_some()
    }

    /// Remove all stale records, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, r| r.is_fresh_at(self.ttl, now));
        let purged = before.saturating_sub(self.records.len());
        self.stats.record_expirations(purged as u64);
        purged
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    /// Number of stored records, fresh or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All fresh records, ordered by prefix.
    pub fn snapshot(&self) -> Vec<(String, Arc<CacheRecord>)> {
        let now = Utc::now();
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_fresh_at(self.ttl, now))
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Cached record for `prefix`, or an exhaustive listing from `store`
    /// which is then cached. The flag is true on a cache hit.
    pub async fn get_or_fetch(
        &self,
        store: &dyn RemoteStore,
        prefix: &str,
    ) -> Result<(Arc<CacheRecord>, bool), StoreError> {
        if let Some(record) = self.get(prefix) {
            return Ok((record, true));
        }
        debug!(prefix, "Fetching listing");
        let listing = store.list(prefix, SortKey::Name, None, None).await?;
        Ok((self.put_listing(prefix, &listing), false))
    }
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
