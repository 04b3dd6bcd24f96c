//! User configuration.
//!
//! Read from `config.toml` in the platform config directory
//! (`~/.config/bucketfs/config.toml` on Linux). Every field is optional; a
//! partial file is merged over the defaults:
//!
//! ```toml
//! [general]
//! workers = 32
//! cache_ttl_secs = 3600
//!
//! [cache]
//! persist = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of concurrent remote requests.
pub const DEFAULT_WORKERS: usize = 16;

/// Default cache TTL in seconds (6 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 21_600;

/// Default depth of the background warm-up crawl.
pub const DEFAULT_CRAWL_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Maximum concurrent remote requests for crawls and transfers.
    pub workers: usize,
    /// Listing cache TTL; 0 disables caching.
    pub cache_ttl_secs: u64,
    /// Depth of the background warm-up crawl.
    pub crawl_depth: usize,
    /// Log at info level even without `-v`.
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            crawl_depth: DEFAULT_CRAWL_DEPTH,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Save the listing cache on shutdown and reload it on startup.
    pub persist: bool,
    /// Override for the cache directory.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persist: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Platform location of `config.toml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "bucketfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse the file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.normalized())
    }

    /// [`load`](Self::load), falling back to the defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring config file");
            Self::default()
        })
    }

    fn normalized(mut self) -> Self {
        self.general.workers = self.general.workers.max(1);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.general.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.general.cache_ttl_secs = ttl.as_secs();
        self
    }

    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.cache.persist = persist;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache.dir = Some(dir.into());
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.general.cache_ttl_secs)
    }

    /// Directory holding persisted caches, if any can be determined.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.dir.clone().or_else(crate::cache::default_cache_dir)
    }
}
