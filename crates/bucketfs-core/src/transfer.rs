//! Parallel downloads and uploads with per-item failure isolation.
//!
//! Items are pre-filtered by size without touching the store, then handed
//! to a pool of at most `concurrency` in-flight transfers. Each item ends up
//! in exactly one of `succeeded`, `skipped` or `errors`; a failing item never
//! stops the others.

use crate::cache::NamespaceCache;
use crate::cancel::CancelFlag;
use crate::error::TransferError;
use crate::path;
use crate::store::RemoteStore;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A remote object to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub key: String,
    pub size: u64,
}

impl TransferItem {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// A local file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub key: String,
    pub size: u64,
}

/// Knobs shared by downloads and uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Maximum transfers in flight. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Download every file directly into the destination by basename.
    pub flat: bool,
    /// Items strictly larger than this are skipped.
    pub max_size: Option<u64>,
    /// Prefix stripped from keys before they are mapped under the
    /// destination (keys outside it keep their full path).
    pub relative_to: Option<String>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_WORKERS,
            flat: false,
            max_size: None,
            relative_to: None,
        }
    }
}

impl TransferOptions {
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_relative_to(mut self, prefix: impl Into<String>) -> Self {
        self.relative_to = Some(prefix.into());
        self
    }
}

/// Why an item was not transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ExceedsMaxSize { size: u64, max: u64 },
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExceedsMaxSize { size, max } => {
                write!(f, "exceeds max-size ({size} > {max} bytes)")
            }
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Partition of a batch by result, each entry keyed by remote key.
#[derive(Debug, Default)]
pub struct TransferOutcome {
    /// Remote key and local path of every completed item.
    pub succeeded: Vec<(String, PathBuf)>,
    pub skipped: Vec<(String, SkipReason)>,
    pub errors: Vec<(String, TransferError)>,
}

impl TransferOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.errors.len()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-completion progress: `(completed, total, key)`.
pub type TransferProgressFn<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);

/// Runs batches of transfers against one store.
#[derive(Clone)]
pub struct TransferExecutor {
    store: Arc<dyn RemoteStore>,
    cache: Arc<NamespaceCache>,
    cancel: CancelFlag,
}

enum ItemResult {
    Done(String, PathBuf),
    Failed(String, TransferError),
    Cancelled(String),
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            cache: Arc::new(NamespaceCache::disabled()),
            cancel: CancelFlag::new(),
        }
    }

    /// Cache to invalidate after uploads.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<NamespaceCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Download `items` under `dest_root`.
    ///
    /// Without `flat`, each key's segments become nested directories below
    /// `dest_root`, created as needed.
    #[instrument(level = "debug", skip(self, items, options, progress), fields(items = items.len(), dest = %dest_root.display()))]
    pub async fn download(
        &self,
        items: Vec<TransferItem>,
        dest_root: &Path,
        options: &TransferOptions,
        progress: Option<TransferProgressFn<'_>>,
    ) -> TransferOutcome {
        let mut outcome = TransferOutcome::default();
        let pending: Vec<TransferItem> = items
            .into_iter()
            .filter(|item| match options.max_size {
                Some(max) if item.size > max => {
                    debug!(key = %item.key, size = item.size, max, "Skipping oversized object");
                    outcome.skipped.push((
                        item.key.clone(),
                        SkipReason::ExceedsMaxSize {
                            size: item.size,
                            max,
                        },
                    ));
                    false
                }
                _ => true,
            })
            .collect();

        let flat = options.flat;
        let base = options.relative_to.as_deref().unwrap_or("");
        let jobs = pending.into_iter().map(|item| async move {
            if self.cancel.is_cancelled() {
                return ItemResult::Cancelled(item.key);
            }
            match self.download_one(&item.key, base, dest_root, flat).await {
                Ok(local) => ItemResult::Done(item.key, local),
                Err(e) => ItemResult::Failed(item.key, e),
            }
        });
        self.drive(jobs, options.concurrency, progress, &mut outcome)
            .await;

        info!(
            succeeded = outcome.succeeded.len(),
            skipped = outcome.skipped.len(),
            errors = outcome.errors.len(),
            "Download batch finished"
        );
        outcome
    }

    async fn download_one(
        &self,
        key: &str,
        base: &str,
        dest_root: &Path,
        flat: bool,
    ) -> Result<PathBuf, TransferError> {
        let relative = key.strip_prefix(base).unwrap_or(key);
        let local = path::local_path_for(dest_root, relative, flat)?;
        if let Some(parent) = local.parent() {
            // create_dir_all tolerates a concurrent creator.
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TransferError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.store.download(key, &local).await?;
        Ok(local)
    }

    /// Upload local files. Each uploaded key invalidates its parent listing.
    #[instrument(level = "debug", skip(self, items, options, progress), fields(items = items.len()))]
    pub async fn upload(
        &self,
        items: Vec<UploadItem>,
        options: &TransferOptions,
        progress: Option<TransferProgressFn<'_>>,
    ) -> TransferOutcome {
        let mut outcome = TransferOutcome::default();
        let pending: Vec<UploadItem> = items
            .into_iter()
            .filter(|item| match options.max_size {
                Some(max) if item.size > max => {
                    outcome.skipped.push((
                        item.key.clone(),
                        SkipReason::ExceedsMaxSize {
                            size: item.size,
                            max,
                        },
                    ));
                    false
                }
                _ => true,
            })
            .collect();

        let jobs = pending.into_iter().map(|item| async move {
            if self.cancel.is_cancelled() {
                return ItemResult::Cancelled(item.key);
            }
            match self.store.upload(&item.local_path, &item.key).await {
                Ok(()) => {
                    self.cache.invalidate(&item.key);
                    ItemResult::Done(item.key, item.local_path)
                }
                Err(e) => ItemResult::Failed(item.key, e.into()),
            }
        });
        self.drive(jobs, options.concurrency, progress, &mut outcome)
            .await;
        outcome
    }

    /// Run `jobs` through the bounded pool, collecting results in
    /// completion order.
    async fn drive<I>(
        &self,
        jobs: I,
        concurrency: usize,
        progress: Option<TransferProgressFn<'_>>,
        outcome: &mut TransferOutcome,
    ) where
        I: Iterator,
        I::Item: Future<Output = ItemResult>,
    {
        let jobs: Vec<_> = jobs.collect();
        let total = jobs.len();
        let mut completed = 0;
        let mut results = stream::iter(jobs).buffer_unordered(concurrency.max(1));

        while let Some(result) = results.next().await {
            let key = match result {
                ItemResult::Done(key, local) => {
                    outcome.succeeded.push((key.clone(), local));
                    key
                }
                ItemResult::Failed(key, e) => {
                    warn!(key = %key, error = %e, "Transfer failed");
                    outcome.errors.push((key.clone(), e));
                    key
                }
                ItemResult::Cancelled(key) => {
                    outcome.skipped.push((key, SkipReason::Cancelled));
                    continue;
                }
            };
            completed += 1;
            if let Some(cb) = progress {
                cb(completed, total, &key);
            }
        }
    }
}
