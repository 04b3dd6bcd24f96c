//! In-process object store.
//!
//! Objects live in a sorted map, so listings follow the same rules as a real
//! delimiter-aware object store: keys are visited in byte order, everything
//! past the next `/` collapses into one common prefix, and the continuation
//! token is the last key or common prefix returned.

use super::{
    DEFAULT_CONTENT_TYPE, FileEntry, Listing, ObjectMetadata, PageToken, RemoteStore, StoreStats,
    read_local, validate_key,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use tracing::trace;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    content_type: String,
}

/// Object store held entirely in memory.
///
/// # Example
///
/// ```
/// use bucketfs_core::store::{MemoryStore, RemoteStore, SortKey};
///
/// # tokio_test_block_on(async {
/// let store = MemoryStore::new("demo");
/// store.insert("docs/readme.md", b"hello".to_vec());
/// store.insert("top.txt", b"x".to_vec());
///
/// let root = store.list("", SortKey::Name, None, None).await.unwrap();
/// assert_eq!(root.directories, ["docs"]);
/// assert_eq!(root.files[0].name, "top.txt");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace an object stamped with the current time.
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.insert_at(key, data, Utc::now());
    }

    /// Insert or replace an object with an explicit modification time.
    pub fn insert_at(&self, key: impl Into<String>, data: Vec<u8>, last_modified: DateTime<Utc>) {
        let key = key.into();
        let content_type = mime_guess::from_path(&key)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        self.objects.write().insert(
            key,
            MemoryObject {
                data,
                last_modified,
                content_type,
            },
        );
    }

    /// Remove an object, returning whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn object(&self, key: &str) -> Result<MemoryObject, StoreError> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn identity(&self) -> String {
        format!("memory-{}", self.name)
    }

    fn display_root(&self) -> String {
        format!("mem://{}/", self.name)
    }

    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        let objects = self.objects.read();
        let start = match token {
            Some(t) => Bound::Excluded(t.as_str()),
            None => Bound::Included(prefix),
        };
        // A token that is itself a common prefix means everything under it
        // was already reported.
        let mut collapsed: Option<String> = token
            .map(PageToken::as_str)
            .filter(|t| t.ends_with('/'))
            .map(str::to_string);

        let mut listing = Listing::default();
        let mut emitted = 0usize;
        let mut last_item: Option<String> = None;

        for (key, object) in objects.range::<str, _>((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if collapsed.as_deref().is_some_and(|c| key.starts_with(c)) {
                continue;
            }
            let rest = &key[prefix.len()..];
            if rest.is_empty() {
                // Directory placeholder object.
                continue;
            }

            if emitted == limit {
                listing.next_token = last_item.map(PageToken::new);
                break;
            }

            match rest.find('/') {
                Some(idx) => {
                    let common = format!("{prefix}{}", &rest[..=idx]);
                    let name = &rest[..idx];
                    if !name.is_empty() {
                        listing.directories.push(name.to_string());
                    }
                    collapsed = Some(common.clone());
                    last_item = Some(common);
                }
                None => {
                    listing.files.push(
                        FileEntry::new(rest, object.data.len() as u64, object.last_modified)
                            .with_content_type(object.content_type.clone()),
                    );
                    last_item = Some(key.clone());
                }
            }
            emitted += 1;
        }

        trace!(
            prefix,
            dirs = listing.directories.len(),
            files = listing.files.len(),
            more = listing.next_token.is_some(),
            "memory list page"
        );
        Ok(listing)
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self.object(key)?.data)
    }

    async fn read_range(&self, key: &str, size: u64) -> Result<Vec<u8>, StoreError> {
        if size == 0 {
            return Err(StoreError::InvalidArgument {
                message: "range size must be positive".to_string(),
            });
        }
        let mut data = self.object(key)?.data;
        data.truncate(usize::try_from(size).unwrap_or(usize::MAX));
        Ok(data)
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let data = read_local(local_path).await?;
        self.insert(key, data);
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let object = self.object(key)?;
        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            last_modified: object.last_modified,
            content_type: object.content_type,
        })
    }

    async fn store_stats(&self) -> Result<StoreStats, StoreError> {
        let objects = self.objects.read();
        let total: u64 = objects.values().map(|o| o.data.len() as u64).sum();
        let mut stats = StoreStats::default();
        stats.push("Backend", "memory");
        stats.push("Name", self.name.clone());
        stats.push("Objects", objects.len().to_string());
        stats.push("Size", total.to_string());
        Ok(stats)
    }
}
