//! The remote store contract and its backend variants.
//!
//! A [`RemoteStore`] exposes a flat key/value namespace through paginated,
//! prefix-scoped listing with `/` as the delimiter, plus object reads and
//! writes. Everything above this module (cache, crawler, transfer executor)
//! talks to stores only through this trait.
//!
//! # Variants
//!
//! - [`MemoryStore`] - in-process objects, real pagination semantics
//! - [`LocalStore`] - a local directory presented as a bucket
//! - [`MultiRootStore`] - aggregates named stores under one root
//!
//! The variant is chosen once, at construction; callers hold an
//! `Arc<dyn RemoteStore>` and never depend on which one it is.

mod local;
mod memory;
mod multi;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use multi::MultiRootStore;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Page size used when a listing is drained to completion.
pub const EXHAUSTIVE_PAGE_SIZE: usize = 1000;

/// Content type reported when a backend does not know better.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One object directly under a listed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Name relative to the listed prefix.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Lowercase extension including the dot, or empty.
    #[serde(default)]
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            name,
            size,
            last_modified,
            extension,
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Lowercase extension of a file name including the leading dot.
///
/// Dotfiles without a further extension (`.env`) have no extension.
pub fn extension_of(name: &str) -> String {
    let base = crate::path::basename(name);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => base[idx..].to_lowercase(),
    }
}

/// Ordering applied to the files of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Ascending by name.
    #[default]
    Name,
    /// Newest first.
    Date,
    /// Largest first.
    Size,
}

impl FromStr for SortKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "date" => Ok(SortKey::Date),
            "size" => Ok(SortKey::Size),
            other => Err(StoreError::InvalidArgument {
                message: format!("invalid sort key '{other}' (name|date|size)"),
            }),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Name => "name",
            SortKey::Date => "date",
            SortKey::Size => "size",
        })
    }
}

/// Opaque continuation token for caller-driven pagination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of listing one prefix (or one page of it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Child directory names, without the trailing `/`.
    pub directories: Vec<String>,
    pub files: Vec<FileEntry>,
    /// Present when more pages remain.
    pub next_token: Option<PageToken>,
}

impl Listing {
    /// Sort directories by name (dropping duplicates) and files by `sort`.
    pub fn sort(&mut self, sort: SortKey) {
        self.directories.sort();
        self.directories.dedup();
        sort_files(&mut self.files, sort);
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Sort file entries in place.
pub fn sort_files(files: &mut [FileEntry], sort: SortKey) {
    match sort {
        SortKey::Name => files.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Date => files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
        SortKey::Size => files.sort_by(|a, b| b.size.cmp(&a.size)),
    }
}

/// Object metadata as returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
}

/// Backend-specific statistics, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: Vec<(String, String)>,
}

impl StoreStats {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A flat, prefix-delimited object store.
///
/// Implementations must be safe to call from many tasks at once. A backend
/// whose client is not thread-safe should create a client per call.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Stable identity used to name the persisted cache file.
    fn identity(&self) -> String;

    /// Human-facing root, e.g. `mem://photos/`.
    fn display_root(&self) -> String;

    /// List at most `limit` entries directly under `prefix`, starting after
    /// `token`. Directories and files both count toward `limit`. Entries are
    /// returned in key order; sorting is applied by [`list`](Self::list).
    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError>;

    /// List `prefix`.
    ///
    /// With `limit = None` every page is fetched and merged (exhaustive
    /// mode). With `Some(n)` a single page is returned together with the
    /// token for the next one (caller-driven mode).
    async fn list(
        &self,
        prefix: &str,
        sort: SortKey,
        limit: Option<usize>,
        next_token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        let mut listing = match limit {
            Some(0) => {
                return Err(StoreError::InvalidArgument {
                    message: "listing limit must be positive".to_string(),
                });
            }
            Some(limit) => self.list_page(prefix, limit, next_token).await?,
            None => {
                let mut all = Listing::default();
                let mut token = next_token.cloned();
                loop {
                    let page = self
                        .list_page(prefix, EXHAUSTIVE_PAGE_SIZE, token.as_ref())
                        .await?;
                    all.directories.extend(page.directories);
                    all.files.extend(page.files);
                    match page.next_token {
                        Some(next) => token = Some(next),
                        None => break,
                    }
                }
                all
            }
        };
        listing.sort(sort);
        Ok(listing)
    }

    /// Read a whole object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Read the first `size` bytes of an object.
    async fn read_range(&self, key: &str, size: u64) -> Result<Vec<u8>, StoreError>;

    /// Write an object's content to `local_path`. The parent directory must exist.
    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let data = self.get_object(key).await?;
        tokio::fs::write(local_path, data)
            .await
            .map_err(|e| StoreError::Io {
                context: format!("writing {}", local_path.display()),
                source: e,
            })
    }

    /// Store the content of `local_path` under `key`.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError>;

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError>;

    /// Basic statistics about the store (location, object counts, ...).
    async fn store_stats(&self) -> Result<StoreStats, StoreError>;
}

/// Read a local file for upload, mapping errors to the local path.
pub(crate) async fn read_local(local_path: &Path) -> Result<Vec<u8>, StoreError> {
    tokio::fs::read(local_path)
        .await
        .map_err(|e| StoreError::Io {
            context: format!("reading {}", local_path.display()),
            source: e,
        })
}

/// Reject keys a backend cannot address.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "empty key".to_string(),
        });
    }
    if key.ends_with('/') {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "keys cannot end with '/'".to_string(),
        });
    }
    Ok(())
}
