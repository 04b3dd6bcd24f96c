//! On-disk persistence of the namespace cache.
//!
//! One JSON file per backend identity:
//!
//! ```json
//! { "version": 1, "backend": "memory-demo",
//!   "records": { "a/": { "directories": [..], "files": [..], "fetched_at": "2024-..Z" } } }
//! ```
//!
//! The file is advisory. Any failure to read it leaves the caller with an
//! empty cache; stale records are neither written nor loaded.

use super::{CacheRecord, NamespaceCache};
use crate::error::CacheError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current persistence format version.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    backend: String,
    #[serde(default)]
    records: BTreeMap<String, CacheRecord>,
}

/// Platform cache directory for bucketfs, if one can be determined.
pub fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "bucketfs").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Cache file for a backend identity inside `dir`.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced so any identity maps to
/// a single file name.
pub fn cache_file_path(dir: &Path, identity: &str) -> PathBuf {
    let sanitized: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{sanitized}.json"))
}

impl NamespaceCache {
    /// Write all fresh records to `path` atomically.
    ///
    /// Returns the number of records written.
    pub fn save_to(&self, path: &Path, identity: &str) -> Result<usize, CacheError> {
        let io_err = |source: io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        let persisted = PersistedCache {
            version: CACHE_FORMAT_VERSION,
            backend: identity.to_string(),
            records: self
                .snapshot()
                .into_iter()
                .map(|(prefix, record)| (prefix, (*record).clone()))
                .collect(),
        };
        let count = persisted.records.len();

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &persisted).map_err(|source| CacheError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            writer.flush().map_err(io_err)?;
        }
        temp.persist(path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), records = count, "Saved namespace cache");
        Ok(count)
    }

    /// Load a cache written by [`save_to`](Self::save_to).
    ///
    /// A missing file yields an empty cache. Records already stale under
    /// `ttl` are dropped.
    pub fn load_from(path: &Path, identity: &str, ttl: Duration) -> Result<Self, CacheError> {
        let cache = Self::new(ttl);
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No persisted cache");
                return Ok(cache);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let persisted: PersistedCache =
            serde_json::from_str(&contents).map_err(|source| CacheError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if persisted.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                found: persisted.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        if persisted.backend != identity {
            return Err(CacheError::BackendMismatch {
                found: persisted.backend,
                expected: identity.to_string(),
            });
        }

        if cache.is_enabled() {
            let now = Utc::now();
            for (prefix, record) in persisted.records {
                if record.is_fresh_at(ttl, now) {
                    cache.records.insert(prefix, record.into());
                }
            }
        }
        debug!(path = %path.display(), records = cache.len(), "Loaded namespace cache");
        Ok(cache)
    }

    /// [`load_from`](Self::load_from), degrading to an empty cache on error.
    pub fn load_or_empty(path: &Path, identity: &str, ttl: Duration) -> Self {
        match Self::load_from(path, identity, ttl) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "Discarding persisted cache");
                Self::new(ttl)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileEntry;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = cache_file_path(dir.path(), "memory-demo");

        let cache = NamespaceCache::with_defaults();
        cache.put(
            "a/",
            ["b".to_string()],
            vec![FileEntry::new("x.txt", 10, Utc::now())],
        );
        cache.put("", ["a".to_string()], Vec::new());
        assert_eq!(cache.save_to(&path, "memory-demo").unwrap(), 2);

        let loaded = NamespaceCache::load_from(&path, "memory-demo", crate::cache::DEFAULT_TTL)
            .unwrap();
        assert_eq!(loaded.len(), 2);
        let record = loaded.get("a/").unwrap();
        assert_eq!(record.files[0].name, "x.txt");
        assert_eq!(record.files[0].extension, ".txt");
        assert_eq!(*record, *cache.get("a/").unwrap());
    }

    #[test]
    fn test_stale_records_are_not_persisted() {
        let dir = TempDir::new().unwrap();
        let path = cache_file_path(dir.path(), "id");

        let cache = NamespaceCache::new(Duration::from_secs(60));
        cache.insert_record(
            "old/",
            CacheRecord::fetched_at(
                Vec::new(),
                Vec::new(),
                Utc::now() - TimeDelta::seconds(120),
            ),
        );
        cache.put("new/", Vec::new(), Vec::new());
        assert_eq!(cache.save_to(&path, "id").unwrap(), 1);
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            NamespaceCache::load_from(&path, "id", Duration::from_secs(60)),
            Err(CacheError::Parse { .. })
        ));
        let cache = NamespaceCache::load_or_empty(&path, "id", Duration::from_secs(60));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_version_and_backend_checks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");

        std::fs::write(&path, br#"{"version": 99, "backend": "id", "records": {}}"#).unwrap();
        assert!(matches!(
            NamespaceCache::load_from(&path, "id", Duration::from_secs(60)),
            Err(CacheError::VersionMismatch { found: 99, .. })
        ));

        std::fs::write(&path, br#"{"version": 1, "backend": "other", "records": {}}"#).unwrap();
        assert!(matches!(
            NamespaceCache::load_from(&path, "id", Duration::from_secs(60)),
            Err(CacheError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache =
            NamespaceCache::load_from(&dir.path().join("none.json"), "id", Duration::from_secs(1))
                .unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_file_name_is_sanitized() {
        let path = cache_file_path(Path::new("/c"), "local-/home/me/bucket");
        assert_eq!(path, Path::new("/c/local-_home_me_bucket.json"));
    }
}
