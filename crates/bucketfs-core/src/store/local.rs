//! A local directory presented as a bucket.
//!
//! Keys are paths relative to the root with `/` separators. Directories on
//! disk become common prefixes; empty directories are listed like any other.

use super::{
    DEFAULT_CONTENT_TYPE, FileEntry, Listing, ObjectMetadata, PageToken, RemoteStore, StoreStats,
    validate_key,
};
use crate::error::StoreError;
use crate::path::{self, SEPARATOR};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Object store backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

enum LocalItem {
    Dir(String),
    File(FileEntry),
}

impl LocalItem {
    /// The raw key this item sorts and paginates by.
    fn sort_key(&self, prefix: &str) -> String {
        match self {
            LocalItem::Dir(name) => path::child_prefix(prefix, name),
            LocalItem::File(entry) => path::child_key(prefix, &entry.name),
        }
    }
}

impl LocalStore {
    /// Open `root` as a store. The directory must exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let meta = std::fs::metadata(&root).map_err(|e| {
            StoreError::from_io(&root.display().to_string(), "opening store root", e)
        })?;
        if !meta.is_dir() {
            return Err(StoreError::InvalidArgument {
                message: format!("{} is not a directory", root.display()),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key or prefix onto the filesystem, refusing anything that would
    /// leave the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split(SEPARATOR).filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => {
                    return Err(StoreError::InvalidKey {
                        key: key.to_string(),
                        reason: "segment escapes the store root".to_string(),
                    });
                }
            }
        }
        Ok(path)
    }

    async fn file_path(&self, key: &str) -> Result<(PathBuf, Metadata), StoreError> {
        validate_key(key)?;
        let path = self.resolve(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StoreError::from_io(key, format!("stat {}", path.display()), e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok((path, meta))
    }

    async fn read_items(&self, prefix: &str) -> Result<Vec<LocalItem>, StoreError> {
        // "a/b/pre" lists directory "a/b/" and keeps names starting with "pre".
        let dir_part = path::parent_prefix(prefix);
        let name_filter = &prefix[dir_part.len()..];
        let dir = self.resolve(dir_part)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::from_io(
                    prefix,
                    format!("reading directory {}", dir.display()),
                    e,
                ));
            }
        };

        let mut items = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(StoreError::from_io(
                        prefix,
                        format!("reading directory {}", dir.display()),
                        e,
                    ));
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %dir.display(), "Skipping entry with non-UTF-8 name");
                continue;
            };
            if !name.starts_with(name_filter) {
                continue;
            }
            // Follows symlinks; a dangling link is skipped.
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let rel = name[name_filter.len()..].to_string();
            if rel.is_empty() {
                continue;
            }
            if meta.is_dir() {
                items.push(LocalItem::Dir(rel));
            } else if meta.is_file() {
                items.push(LocalItem::File(
                    FileEntry::new(rel, meta.len(), modified_time(&meta))
                        .with_content_type(guess_content_type(&name)),
                ));
            }
        }
        Ok(items)
    }
}

fn modified_time(meta: &Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

#[async_trait]
impl RemoteStore for LocalStore {
    fn identity(&self) -> String {
        let canonical = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        format!("local-{}", canonical.display())
    }

    fn display_root(&self) -> String {
        format!("file://{}/", self.root.display())
    }

    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        let mut items: Vec<(String, LocalItem)> = self
            .read_items(prefix)
            .await?
            .into_iter()
            .map(|item| (item.sort_key(prefix), item))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));

        let start = match token {
            Some(t) => items.partition_point(|(k, _)| k.as_str() <= t.as_str()),
            None => 0,
        };

        let mut listing = Listing::default();
        let remaining = items.len() - start;
        for (key, item) in items.into_iter().skip(start).take(limit) {
            match item {
                LocalItem::Dir(name) => listing.directories.push(name),
                LocalItem::File(entry) => listing.files.push(entry),
            }
            if remaining > limit {
                listing.next_token = Some(PageToken::new(key));
            }
        }
        Ok(listing)
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let (path, _) = self.file_path(key).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io(key, format!("reading {}", path.display()), e))
    }

    async fn read_range(&self, key: &str, size: u64) -> Result<Vec<u8>, StoreError> {
        if size == 0 {
            return Err(StoreError::InvalidArgument {
                message: "range size must be positive".to_string(),
            });
        }
        let (path, meta) = self.file_path(key).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StoreError::from_io(key, format!("opening {}", path.display()), e))?;
        let mut buf = Vec::with_capacity(size.min(meta.len()) as usize);
        file.take(size)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StoreError::from_io(key, format!("reading {}", path.display()), e))?;
        Ok(buf)
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let (path, _) = self.file_path(key).await?;
        tokio::fs::copy(&path, local_path)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Io {
                context: format!("copying {} to {}", path.display(), local_path.display()),
                source: e,
            })
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let target = self.resolve(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(key, format!("creating {}", parent.display()), e))?;
        }
        tokio::fs::copy(local_path, &target)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Io {
                context: format!("copying {} to {}", local_path.display(), target.display()),
                source: e,
            })
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let (_, meta) = self.file_path(key).await?;
        Ok(ObjectMetadata {
            size: meta.len(),
            last_modified: modified_time(&meta),
            content_type: guess_content_type(key),
        })
    }

    async fn store_stats(&self) -> Result<StoreStats, StoreError> {
        let meta = tokio::fs::metadata(&self.root).await.map_err(|e| {
            StoreError::from_io("", format!("stat {}", self.root.display()), e)
        })?;
        let mut stats = StoreStats::default();
        stats.push("Backend", "local");
        stats.push("Root", self.root.display().to_string());
        stats.push(
            "Modified",
            modified_time(&meta).format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        stats.push(
            "Read-only",
            if meta.permissions().readonly() { "yes" } else { "no" },
        );
        Ok(stats)
    }
}
