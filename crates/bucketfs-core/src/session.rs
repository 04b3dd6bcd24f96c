//! Session facade tying store, cache, crawler and transfers together.
//!
//! A [`Session`] is what a front end talks to. It owns the current virtual
//! directory, resolves user paths against it, serves listings through the
//! namespace cache and runs crawls and transfers with the configured worker
//! count. Background jobs (warm-up crawl, store statistics) publish their
//! progress through `watch` channels and touch nothing else.

use crate::cache::{NamespaceCache, cache_file_path};
use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::crawl::{Crawler, DirTree, TraversalResult, WalkProgress, WalkProgressFn};
use crate::diff::{self, DiffReport, DiffSide};
use crate::error::{CacheError, PathError, SessionError, StoreError};
use crate::glob::{self, Glob};
use crate::path;
use crate::store::{FileEntry, Listing, ObjectMetadata, PageToken, RemoteStore, SortKey, StoreStats};
use crate::transfer::{
    TransferExecutor, TransferItem, TransferOptions, TransferOutcome, TransferProgressFn,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Bytes shown by `peek` when no size is given.
pub const DEFAULT_PEEK_BYTES: u64 = 2048;

/// Largest `peek` allowed.
pub const MAX_PEEK_BYTES: u64 = 10 * 1024 * 1024;

/// Objects above this size need confirmation before being printed whole.
pub const CAT_CONFIRM_BYTES: u64 = 1024 * 1024;

/// Default depth for `find`.
pub const DEFAULT_FIND_DEPTH: usize = 5;

/// Default depth for `mirror`.
pub const DEFAULT_MIRROR_DEPTH: usize = 50;

/// Default per-object size cap for `mirror`.
pub const DEFAULT_MIRROR_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// State of the background warm-up crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStatus {
    Pending,
    Running {
        depth: usize,
        cached_prefixes: usize,
    },
    Complete {
        depth: usize,
        cached_prefixes: usize,
        errors: usize,
    },
    Failed {
        message: String,
    },
}

/// State of the background store statistics job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsStatus {
    Pending,
    Loading,
    Ready(StoreStats),
    Failed { message: String },
}

/// What the current credentials can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub list: bool,
    pub read: bool,
    pub stats: bool,
}

/// Aggregate view of everything currently cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub records: usize,
    /// Distinct directories seen, listed or not.
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
    /// File count per extension, most frequent first.
    pub extensions: Vec<(String, usize)>,
}

/// Label used for files without an extension in [`CacheSummary`].
pub const NO_EXTENSION: &str = "<none>";

/// Options for [`Session::mirror`].
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub depth: usize,
    pub max_size: Option<u64>,
    /// Basename patterns; empty admits everything.
    pub include: Vec<Glob>,
    pub exclude: Vec<Glob>,
    pub flat: bool,
    /// Plan only, download nothing.
    pub dry_run: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_MIRROR_DEPTH,
            max_size: Some(DEFAULT_MIRROR_MAX_SIZE),
            include: Vec::new(),
            exclude: Vec::new(),
            flat: false,
            dry_run: false,
        }
    }
}

/// Files selected for a mirror, before any download.
#[derive(Debug, Default)]
pub struct MirrorPlan {
    pub prefix: String,
    /// Files that passed the include/exclude filters.
    pub candidates: Vec<TransferItem>,
    /// Files rejected by the include/exclude filters.
    pub filtered: usize,
    pub max_size: Option<u64>,
    pub walk_errors: Vec<(String, StoreError)>,
}

impl MirrorPlan {
    fn fits(&self, item: &TransferItem) -> bool {
        self.max_size.is_none_or(|max| item.size <= max)
    }

    /// Candidates within the size cap.
    pub fn to_download(&self) -> impl Iterator<Item = &TransferItem> {
        self.candidates.iter().filter(|i| self.fits(i))
    }

    /// Candidates above the size cap.
    pub fn too_large(&self) -> impl Iterator<Item = &TransferItem> {
        self.candidates.iter().filter(|i| !self.fits(i))
    }

    pub fn download_bytes(&self) -> u64 {
        self.to_download().map(|i| i.size).sum()
    }
}

#[derive(Debug)]
pub struct MirrorOutcome {
    pub plan: MirrorPlan,
    /// Absent for dry runs.
    pub transfer: Option<TransferOutcome>,
}

#[derive(Debug, Default)]
pub struct FindOutcome {
    /// Matching files, ordered by key.
    pub matches: Vec<(String, FileEntry)>,
    /// Files examined.
    pub scanned: usize,
    pub errors: Vec<(String, StoreError)>,
    pub cancelled: bool,
}

/// A walked subtree ready for rendering.
#[derive(Debug)]
pub struct TreeView {
    pub tree: DirTree,
    pub walk: TraversalResult,
}

/// An interactive view of one store.
pub struct Session {
    store: Arc<dyn RemoteStore>,
    cache: Arc<NamespaceCache>,
    config: Config,
    cancel: CancelFlag,
    current: String,
    crawl_status: Arc<watch::Sender<CrawlStatus>>,
    stats_status: Arc<watch::Sender<StatsStatus>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store.display_root())
            .field("current", &self.current)
            .field("cached_records", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session, reloading the persisted cache when enabled.
    pub fn new(store: Arc<dyn RemoteStore>, config: Config) -> Self {
        let ttl = config.cache_ttl();
        let cache = match persisted_cache_path(store.as_ref(), &config) {
            Some(path) => NamespaceCache::load_or_empty(&path, &store.identity(), ttl),
            None => NamespaceCache::new(ttl),
        };
        Self::with_cache(store, config, Arc::new(cache))
    }

    /// Open a session over an existing cache.
    pub fn with_cache(
        store: Arc<dyn RemoteStore>,
        config: Config,
        cache: Arc<NamespaceCache>,
    ) -> Self {
        let (crawl_tx, _) = watch::channel(CrawlStatus::Pending);
        let (stats_tx, _) = watch::channel(StatsStatus::Pending);
        Self {
            store,
            cache,
            config,
            cancel: CancelFlag::new(),
            current: String::new(),
            crawl_status: Arc::new(crawl_tx),
            stats_status: Arc::new(stats_tx),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<NamespaceCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Current virtual directory (`""` is the root).
    pub fn current_prefix(&self) -> &str {
        &self.current
    }

    /// Shell prompt text, e.g. `mem://demo/docs/`.
    pub fn prompt(&self) -> String {
        format!("{}{}", self.store.display_root(), self.current)
    }

    fn workers(&self) -> usize {
        self.config.general.workers.max(1)
    }

    pub fn crawler(&self) -> Crawler {
        Crawler::new(Arc::clone(&self.store))
            .with_cache(Arc::clone(&self.cache))
            .with_cancel(self.cancel.clone())
    }

    pub fn transfers(&self) -> TransferExecutor {
        TransferExecutor::new(Arc::clone(&self.store))
            .with_cache(Arc::clone(&self.cache))
            .with_cancel(self.cancel.clone())
    }

    /// Resolve `input` as a directory relative to the current prefix.
    pub fn resolve_dir(&self, input: &str) -> String {
        path::resolve(&self.current, input, true)
    }

    /// Resolve `input` as an object key relative to the current prefix.
    pub fn resolve_key(&self, input: &str) -> Result<String, PathError> {
        path::resolve_key(&self.current, input)
    }

    fn resolve_under(&self, under: Option<&str>) -> String {
        under.map_or_else(|| self.current.clone(), |u| self.resolve_dir(u))
    }

    /// Exhaustive listing of `prefix`, served from the cache when fresh.
    #[instrument(level = "debug", skip(self))]
    pub async fn list(&self, prefix: &str, sort: SortKey) -> Result<Listing, StoreError> {
        if let Some(record) = self.cache.get(prefix) {
            return Ok(record.to_listing(sort));
        }
        debug!(prefix, "Fetching listing");
        let listing = self.store.list(prefix, sort, None, None).await?;
        self.cache.put_listing(prefix, &listing);
        Ok(listing)
    }

    /// One page of `prefix`. Pages bypass the cache.
    pub async fn list_page(
        &self,
        prefix: &str,
        sort: SortKey,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        self.store.list(prefix, sort, Some(limit), token).await
    }

    /// Change the current directory.
    ///
    /// The target must appear among its parent's directories. The root, the
    /// current directory and paths whose last segment is `..` are accepted
    /// without a lookup.
    #[instrument(level = "debug", skip(self))]
    pub async fn cd(&mut self, input: &str) -> Result<(), SessionError> {
        let target = self.resolve_dir(input);
        let ends_in_parent = input
            .split(path::SEPARATOR)
            .rfind(|s| !s.is_empty())
            .is_some_and(|s| s == "..");
        if target.is_empty() || target == self.current || ends_in_parent {
            self.current = target;
            return Ok(());
        }

        let parent = path::parent_of_prefix(&target);
        let name = path::dir_name(&target);
        let listing = self.list(parent, SortKey::Name).await?;
        if listing.directories.iter().any(|d| d == name) {
            self.current = target;
            Ok(())
        } else {
            Err(PathError::NotADirectory {
                path: input.to_string(),
            }
            .into())
        }
    }

    /// Metadata of the object at `input`.
    ///
    /// The parent listing answers when it carries everything needed;
    /// otherwise the store is asked directly.
    pub async fn stat(&self, input: &str) -> Result<(String, ObjectMetadata), SessionError> {
        let key = self.resolve_key(input)?;
        let parent = path::parent_prefix(&key);
        let name = path::basename(&key);

        if let Ok(listing) = self.list(parent, SortKey::Name).await {
            if let Some(entry) = listing.files.iter().find(|f| f.name == name)
                && let Some(content_type) = &entry.content_type
            {
                let meta = ObjectMetadata {
                    size: entry.size,
                    last_modified: entry.last_modified,
                    content_type: content_type.clone(),
                };
                return Ok((key, meta));
            }
            if listing.directories.iter().any(|d| d == name)
                && !listing.files.iter().any(|f| f.name == name)
            {
                return Err(PathError::NotAFile { path: key }.into());
            }
        }

        let meta = self.store.get_metadata(&key).await?;
        Ok((key, meta))
    }

    /// Whole object at `input`, refusing objects above `limit` bytes.
    pub async fn read(
        &self,
        input: &str,
        limit: Option<u64>,
    ) -> Result<(String, Vec<u8>), SessionError> {
        let key = self.resolve_key(input)?;
        if let Some(limit) = limit {
            let meta = self.store.get_metadata(&key).await?;
            if meta.size > limit {
                return Err(SessionError::TooLarge {
                    key,
                    size: meta.size,
                    limit,
                });
            }
        }
        let data = self.store.get_object(&key).await?;
        Ok((key, data))
    }

    /// First `bytes` bytes (default 2048, at most 10 MiB) of the object.
    pub async fn peek(
        &self,
        input: &str,
        bytes: Option<u64>,
    ) -> Result<(String, Vec<u8>), SessionError> {
        let bytes = bytes.unwrap_or(DEFAULT_PEEK_BYTES);
        if bytes == 0 {
            return Err(SessionError::InvalidArgument {
                message: "peek size must be positive".to_string(),
            });
        }
        if bytes > MAX_PEEK_BYTES {
            return Err(SessionError::InvalidArgument {
                message: format!("peek size is limited to {MAX_PEEK_BYTES} bytes"),
            });
        }
        let key = self.resolve_key(input)?;
        let data = self.store.read_range(&key, bytes).await?;
        Ok((key, data))
    }

    /// Download one object.
    ///
    /// With no destination the object lands in the working directory under
    /// its basename; an existing directory (or a path ending in a separator)
    /// receives it under its basename; anything else is the target file.
    pub async fn get(&self, input: &str, dest: Option<&Path>) -> Result<PathBuf, SessionError> {
        let key = self.resolve_key(input)?;
        let name = path::basename(&key);
        let target = match dest {
            None => PathBuf::from(name),
            Some(d) if is_directory_target(d).await => d.join(name),
            Some(d) => d.to_path_buf(),
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SessionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.store.download(&key, &target).await?;
        info!(key = %key, path = %target.display(), "Downloaded object");
        Ok(target)
    }

    /// Download every file in one directory whose name matches the last
    /// segment of `pattern_input` (`logs/*.gz`), flat into `local_dir`.
    pub async fn get_matching(
        &self,
        pattern_input: &str,
        local_dir: &Path,
        progress: Option<TransferProgressFn<'_>>,
    ) -> Result<TransferOutcome, SessionError> {
        let (dir_part, pattern) = match pattern_input.rsplit_once(path::SEPARATOR) {
            Some((dir, pattern)) => (dir, pattern),
            None => ("", pattern_input),
        };
        let prefix = if pattern_input.starts_with(path::SEPARATOR) && dir_part.is_empty() {
            String::new()
        } else {
            self.resolve_dir(dir_part)
        };
        let glob = Glob::new(pattern)?;
        let listing = self.list(&prefix, SortKey::Name).await?;

        let items: Vec<TransferItem> = listing
            .files
            .iter()
            .filter(|f| glob.matches(&f.name))
            .map(|f| TransferItem::new(path::child_key(&prefix, &f.name), f.size))
            .collect();
        if items.is_empty() {
            return Ok(TransferOutcome::default());
        }

        let options = TransferOptions::default()
            .with_concurrency(self.workers())
            .with_flat(true);
        Ok(self
            .transfers()
            .download(items, local_dir, &options, progress)
            .await)
    }

    /// Compare two files, each local or remote (see [`DiffSide::parse`]).
    ///
    /// Remote sides are downloaded into a scratch directory that is removed
    /// before returning.
    #[instrument(level = "debug", skip(self))]
    pub async fn diff(&self, left: &str, right: &str) -> Result<DiffReport, SessionError> {
        let scratch = tempfile::Builder::new()
            .prefix("bucketfs-diff-")
            .tempdir()
            .map_err(|source| SessionError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let (left_name, left_data) = self
            .fetch_diff_side(DiffSide::parse(left), scratch.path(), "left")
            .await?;
        let (right_name, right_data) = self
            .fetch_diff_side(DiffSide::parse(right), scratch.path(), "right")
            .await?;
        Ok(diff::compare(&left_name, &left_data, &right_name, &right_data))
    }

    async fn fetch_diff_side(
        &self,
        side: DiffSide,
        scratch: &Path,
        label: &str,
    ) -> Result<(String, Vec<u8>), SessionError> {
        let (name, file) = match side {
            DiffSide::Local(file) => (file.display().to_string(), file),
            DiffSide::Remote(input) => {
                let key = self.resolve_key(&input)?;
                let file = scratch.join(format!("{label}-{}", path::basename(&key)));
                self.store.download(&key, &file).await?;
                debug!(key = %key, "Fetched remote side for diff");
                (key, file)
            }
        };
        let data = tokio::fs::read(&file)
            .await
            .map_err(|source| SessionError::Io { path: file, source })?;
        Ok((name, data))
    }

    /// Upload a local file.
    ///
    /// A remote path ending in `/` (or `.`/empty) names a directory and the
    /// local basename is appended. Returns the key written.
    #[instrument(level = "debug", skip(self))]
    pub async fn put(&self, local: &Path, remote: &str) -> Result<String, SessionError> {
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(|source| SessionError::Io {
                path: local.to_path_buf(),
                source,
            })?;
        if !meta.is_file() {
            return Err(SessionError::InvalidArgument {
                message: format!("{} is not a regular file", local.display()),
            });
        }

        let names_directory = remote.is_empty()
            || remote.ends_with(path::SEPARATOR)
            || matches!(path::basename(remote), "." | "..");
        let key = if names_directory {
            let name = local
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| SessionError::InvalidArgument {
                    message: format!("{} has no usable file name", local.display()),
                })?;
            path::child_key(&self.resolve_dir(remote), name)
        } else {
            self.resolve_key(remote)?
        };

        self.store.upload(local, &key).await?;
        self.cache.invalidate(&key);
        info!(key = %key, "Uploaded object");
        Ok(key)
    }

    /// Files under `under` (default: current directory) whose basename
    /// matches `pattern`.
    pub async fn find(
        &self,
        pattern: &str,
        under: Option<&str>,
        depth: usize,
        progress: Option<WalkProgressFn<'_>>,
    ) -> Result<FindOutcome, SessionError> {
        let glob = Glob::new(pattern)?;
        let root = self.resolve_under(under);
        let walk = self
            .crawler()
            .walk_with_progress(&root, depth, self.workers(), progress)
            .await;

        let scanned = walk.all_files.len();
        let mut matches: Vec<(String, FileEntry)> = walk
            .all_files
            .into_iter()
            .filter(|(_, f)| glob.matches(path::basename(&f.name)))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(FindOutcome {
            matches,
            scanned,
            errors: walk.errors,
            cancelled: walk.cancelled,
        })
    }

    /// Walk `under` to `depth` and assemble the tree.
    pub async fn tree(
        &self,
        under: Option<&str>,
        depth: usize,
        progress: Option<WalkProgressFn<'_>>,
    ) -> TreeView {
        let root = self.resolve_under(under);
        let walk = self
            .crawler()
            .walk_with_progress(&root, depth, self.workers(), progress)
            .await;
        TreeView {
            tree: DirTree::from_traversal(&root, &walk),
            walk,
        }
    }

    /// Crawl `remote` and select the files to mirror into `local_dir`.
    ///
    /// Local paths are relative to the mirrored prefix unless `flat`.
    #[instrument(level = "debug", skip(self, options, walk_progress, progress))]
    pub async fn mirror(
        &self,
        remote: &str,
        local_dir: &Path,
        options: &MirrorOptions,
        walk_progress: Option<WalkProgressFn<'_>>,
        progress: Option<TransferProgressFn<'_>>,
    ) -> MirrorOutcome {
        let prefix = self.resolve_dir(remote);
        let walk = self
            .crawler()
            .walk_with_progress(&prefix, options.depth, self.workers(), walk_progress)
            .await;

        let mut plan = MirrorPlan {
            prefix: prefix.clone(),
            max_size: options.max_size,
            walk_errors: walk.errors,
            ..MirrorPlan::default()
        };
        for (key, entry) in walk.all_files {
            if glob::passes_filters(path::basename(&entry.name), &options.include, &options.exclude)
            {
                plan.candidates.push(TransferItem::new(key, entry.size));
            } else {
                plan.filtered += 1;
            }
        }
        plan.candidates.sort_by(|a, b| a.key.cmp(&b.key));

        if options.dry_run || self.cancel.is_cancelled() {
            return MirrorOutcome {
                plan,
                transfer: None,
            };
        }

        let transfer_options = TransferOptions::default()
            .with_concurrency(self.workers())
            .with_flat(options.flat)
            .with_max_size(options.max_size)
            .with_relative_to(prefix);
        let transfer = self
            .transfers()
            .download(plan.candidates.clone(), local_dir, &transfer_options, progress)
            .await;
        MirrorOutcome {
            plan,
            transfer: Some(transfer),
        }
    }

    /// Totals over every fresh cache record.
    pub fn cache_summary(&self) -> CacheSummary {
        let snapshot = self.cache.snapshot();
        let mut directories = BTreeSet::new();
        let mut extensions: BTreeMap<String, usize> = BTreeMap::new();
        let mut summary = CacheSummary {
            records: snapshot.len(),
            ..CacheSummary::default()
        };

        for (prefix, record) in &snapshot {
            directories.insert(prefix.clone());
            for dir in &record.directories {
                directories.insert(path::child_prefix(prefix, dir));
            }
            for file in &record.files {
                summary.files += 1;
                summary.bytes += file.size;
                let ext = if file.extension.is_empty() {
                    NO_EXTENSION
                } else {
                    file.extension.as_str()
                };
                *extensions.entry(ext.to_string()).or_default() += 1;
            }
        }

        summary.directories = directories.len();
        summary.extensions = extensions.into_iter().collect();
        summary
            .extensions
            .sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary
    }

    /// Probe list, read and statistics access with cheap requests.
    pub async fn probe_permissions(&self) -> Permissions {
        let mut perms = Permissions::default();
        let mut sample_key = None;

        if let Ok(root) = self.store.list("", SortKey::Name, Some(1), None).await {
            perms.list = true;
            if let Some(file) = root.files.first() {
                sample_key = Some(file.name.clone());
            } else if let Some(dir) = root.directories.first() {
                let sub = path::child_prefix("", dir);
                if let Ok(listing) = self.store.list(&sub, SortKey::Name, Some(1), None).await
                    && let Some(file) = listing.files.first()
                {
                    sample_key = Some(path::child_key(&sub, &file.name));
                }
            }
        }

        if let Some(key) = sample_key {
            perms.read = self.store.get_metadata(&key).await.is_ok();
        }
        perms.stats = self.store.store_stats().await.is_ok();
        debug!(?perms, "Probed permissions");
        perms
    }

    /// Subscribe to warm-up crawl progress.
    pub fn crawl_status(&self) -> watch::Receiver<CrawlStatus> {
        self.crawl_status.subscribe()
    }

    /// Subscribe to the store statistics job.
    pub fn stats_status(&self) -> watch::Receiver<StatsStatus> {
        self.stats_status.subscribe()
    }

    /// Crawl from the root to `depth` in the background, filling the cache.
    pub fn spawn_warmup(&self, depth: usize) -> JoinHandle<()> {
        let crawler = self.crawler();
        let status = Arc::clone(&self.crawl_status);
        let workers = self.workers();

        tokio::spawn(async move {
            info!(depth, workers, "Background crawl started");
            status.send_replace(CrawlStatus::Running {
                depth: 0,
                cached_prefixes: 0,
            });

            let deepest = AtomicUsize::new(0);
            let report = |p: &WalkProgress| {
                let depth = deepest.fetch_max(p.depth, Ordering::Relaxed).max(p.depth);
                status.send_replace(CrawlStatus::Running {
                    depth,
                    cached_prefixes: p.listed,
                });
            };
            let result = crawler
                .walk_with_progress("", depth, workers, Some(&report))
                .await;

            let next = match result.errors.first() {
                Some((_, e)) if result.listed.is_empty() => CrawlStatus::Failed {
                    message: e.to_string(),
                },
                _ => CrawlStatus::Complete {
                    depth: deepest.load(Ordering::Relaxed),
                    cached_prefixes: result.listed.len(),
                    errors: result.errors.len(),
                },
            };
            info!(status = ?next, "Background crawl finished");
            status.send_replace(next);
        })
    }

    /// Collect [`RemoteStore::store_stats`] in the background.
    pub fn spawn_stats(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let status = Arc::clone(&self.stats_status);

        tokio::spawn(async move {
            status.send_replace(StatsStatus::Loading);
            let next = match store.store_stats().await {
                Ok(stats) => StatsStatus::Ready(stats),
                Err(e) => StatsStatus::Failed {
                    message: e.to_string(),
                },
            };
            status.send_replace(next);
        })
    }

    /// Stop background work and persist the cache if enabled.
    ///
    /// Returns the cache file written, if any.
    pub fn shutdown(&self) -> Result<Option<PathBuf>, CacheError> {
        self.cancel.cancel();
        match persisted_cache_path(self.store.as_ref(), &self.config) {
            Some(path) => {
                self.cache.save_to(&path, &self.store.identity())?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}

fn persisted_cache_path(store: &dyn RemoteStore, config: &Config) -> Option<PathBuf> {
    if !config.cache.persist || config.cache_ttl().is_zero() {
        return None;
    }
    config
        .cache_dir()
        .map(|dir| cache_file_path(&dir, &store.identity()))
}

async fn is_directory_target(dest: &Path) -> bool {
    let text = dest.as_os_str().to_string_lossy();
    if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        return true;
    }
    tokio::fs::metadata(dest)
        .await
        .is_ok_and(|m| m.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn memory() -> Arc<MemoryStore> {
        let store = MemoryStore::new("session");
        store.insert("readme.md", b"# hello".to_vec());
        store.insert("docs/guide.txt", b"guide".to_vec());
        store.insert("docs/api/index.html", b"<html>".to_vec());
        store.insert("logs/2024/app-1.log", vec![b'a'; 10]);
        store.insert("logs/2024/app-2.log", vec![b'b'; 20]);
        store.insert("logs/2024/app.log.gz", vec![b'c'; 30]);
        Arc::new(store)
    }

    fn session() -> Session {
        Session::new(memory(), Config::default().with_persist(false))
    }

    #[tokio::test]
    async fn test_list_populates_cache() {
        let session = session();
        let listing = session.list("", SortKey::Name).await.unwrap();
        assert_eq!(listing.directories, ["docs", "logs"]);
        assert_eq!(session.cache().len(), 1);

        let again = session.list("", SortKey::Name).await.unwrap();
        assert_eq!(again, listing);
        assert_eq!(session.cache().stats().hit_count(), 1);
    }

    #[tokio::test]
    async fn test_cd_checks_existence() {
        let mut session = session();
        session.cd("docs").await.unwrap();
        assert_eq!(session.current_prefix(), "docs/");

        session.cd("api/").await.unwrap();
        assert_eq!(session.current_prefix(), "docs/api/");

        let err = session.cd("nope").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Path(PathError::NotADirectory { .. })
        ));
        assert_eq!(session.current_prefix(), "docs/api/");

        session.cd("../..").await.unwrap();
        assert_eq!(session.current_prefix(), "");
        session.cd("/logs/2024").await.unwrap();
        assert_eq!(session.current_prefix(), "logs/2024/");
        session.cd("/").await.unwrap();
        assert_eq!(session.current_prefix(), "");
    }

    #[tokio::test]
    async fn test_cd_trailing_dot_still_checks_existence() {
        let mut session = session();
        assert!(matches!(
            session.cd("nope/.").await,
            Err(SessionError::Path(PathError::NotADirectory { .. }))
        ));
        assert!(session.cd("nope/./").await.is_err());
        assert_eq!(session.current_prefix(), "");

        session.cd("docs/.").await.unwrap();
        assert_eq!(session.current_prefix(), "docs/");
        session.cd(".").await.unwrap();
        assert_eq!(session.current_prefix(), "docs/");
        session.cd("api/../.").await.unwrap();
        assert_eq!(session.current_prefix(), "docs/");
    }

    #[tokio::test]
    async fn test_diff_remote_against_local_text() {
        let mut session = session();
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("guide.txt");
        std::fs::write(&local, "guide\nmore\n").unwrap();

        session.cd("docs").await.unwrap();
        let report = session
            .diff("guide.txt", local.to_str().unwrap())
            .await
            .unwrap();
        assert!(report.is_text());
        assert!(!report.is_identical());
        assert_eq!(report.left.name, "docs/guide.txt");
        let unified = report.unified.unwrap();
        assert!(unified.contains("--- docs/guide.txt"));
        assert!(unified.contains("+more"));

        std::fs::write(&local, "guide").unwrap();
        let same = session.diff("guide.txt", local.to_str().unwrap()).await.unwrap();
        assert!(same.is_identical());
        assert!(same.unified.is_none());
    }

    #[tokio::test]
    async fn test_diff_binary_remote_objects() {
        let store = MemoryStore::new("bin");
        store.insert("a.bin", vec![0xff, 0xfe, 0x00]);
        store.insert("b.bin", vec![0xff, 0xfe, 0x00]);
        store.insert("c.bin", vec![0xff, 0xfe, 0x01, 0x02]);
        let session = Session::new(Arc::new(store), Config::default().with_persist(false));

        let same = session.diff("a.bin", "b.bin").await.unwrap();
        assert!(!same.is_text());
        assert!(same.is_identical());
        assert!(same.unified.is_none());

        let differ = session.diff("a.bin", "c.bin").await.unwrap();
        assert!(!differ.is_identical());
        assert_eq!((differ.left.size, differ.right.size), (3, 4));
        assert!(differ.unified.is_none());

        assert!(matches!(
            session.diff("nope.bin", "a.bin").await,
            Err(SessionError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cd_into_file_fails() {
        let mut session = session();
        assert!(session.cd("readme.md").await.is_err());
    }

    #[tokio::test]
    async fn test_stat_and_reads() {
        let session = session();
        let (key, meta) = session.stat("docs/guide.txt").await.unwrap();
        assert_eq!(key, "docs/guide.txt");
        assert_eq!(meta.size, 5);

        assert!(matches!(
            session.stat("docs/api").await,
            Err(SessionError::Path(PathError::NotAFile { .. }))
        ));
        assert!(session.stat("docs/missing.txt").await.is_err());

        let (_, data) = session.read("readme.md", None).await.unwrap();
        assert_eq!(data, b"# hello");
        assert!(matches!(
            session.read("readme.md", Some(3)).await,
            Err(SessionError::TooLarge { size: 7, limit: 3, .. })
        ));

        let (_, head) = session.peek("readme.md", Some(2)).await.unwrap();
        assert_eq!(head, b"# ");
        assert!(session.peek("readme.md", Some(0)).await.is_err());
        assert!(session.peek("readme.md", Some(MAX_PEEK_BYTES + 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_put_invalidates_parent_listing() {
        let store = memory();
        let session = Session::new(store.clone(), Config::default().with_persist(false));
        let before = session.list("docs/", SortKey::Name).await.unwrap();
        assert_eq!(before.files.len(), 1);

        let scratch = TempDir::new().unwrap();
        let local = scratch.path().join("notes.txt");
        std::fs::write(&local, b"n").unwrap();

        let key = session.put(&local, "docs/").await.unwrap();
        assert_eq!(key, "docs/notes.txt");
        assert!(store.contains("docs/notes.txt"));

        let after = session.list("docs/", SortKey::Name).await.unwrap();
        assert_eq!(after.files.len(), 2);

        let key = session.put(&local, "docs/renamed.txt").await.unwrap();
        assert_eq!(key, "docs/renamed.txt");
    }

    #[tokio::test]
    async fn test_find_matches_basenames() {
        let session = session();
        let found = session.find("app-*.log", None, 5, None).await.unwrap();
        let keys: Vec<&str> = found.matches.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["logs/2024/app-1.log", "logs/2024/app-2.log"]);
        assert_eq!(found.scanned, 6);

        let shallow = session.find("*", Some("logs"), 1, None).await.unwrap();
        assert!(shallow.matches.is_empty());
    }

    #[tokio::test]
    async fn test_get_matching_downloads_flat() {
        let session = session();
        let dest = TempDir::new().unwrap();
        let outcome = session
            .get_matching("logs/2024/*.log", dest.path(), None)
            .await
            .unwrap();
        assert_eq!(outcome.succeeded.len(), 2);
        assert!(dest.path().join("app-1.log").exists());
        assert!(!dest.path().join("app.log.gz").exists());

        let none = session
            .get_matching("logs/2024/*.zip", dest.path(), None)
            .await
            .unwrap();
        assert_eq!(none.total(), 0);
    }

    #[tokio::test]
    async fn test_single_get() {
        let session = session();
        let dest = TempDir::new().unwrap();
        let path = session
            .get("docs/guide.txt", Some(dest.path()))
            .await
            .unwrap();
        assert_eq!(path, dest.path().join("guide.txt"));

        let renamed = dest.path().join("sub").join("g.txt");
        session.get("docs/guide.txt", Some(&renamed)).await.unwrap();
        assert_eq!(std::fs::read(renamed).unwrap(), b"guide");
    }

    #[tokio::test]
    async fn test_mirror_plan_and_transfer() {
        let session = session();
        let dest = TempDir::new().unwrap();

        let options = MirrorOptions {
            max_size: Some(25),
            exclude: vec![Glob::new("*-1.log").unwrap()],
            dry_run: true,
            ..MirrorOptions::default()
        };
        let dry = session.mirror("logs", dest.path(), &options, None, None).await;
        assert!(dry.transfer.is_none());
        assert_eq!(dry.plan.filtered, 1);
        assert_eq!(dry.plan.to_download().count(), 1);
        assert_eq!(dry.plan.too_large().count(), 1);
        assert_eq!(dry.plan.download_bytes(), 20);

        let options = MirrorOptions {
            dry_run: false,
            ..options
        };
        let real = session.mirror("logs", dest.path(), &options, None, None).await;
        let transfer = real.transfer.unwrap();
        assert_eq!(transfer.succeeded.len(), 1);
        assert_eq!(transfer.skipped.len(), 1);
        assert!(dest.path().join("2024").join("app-2.log").exists());
    }

    #[tokio::test]
    async fn test_cache_summary() {
        let session = session();
        session.tree(None, 5, None).await;
        let summary = session.cache_summary();
        assert_eq!(summary.files, 6);
        assert_eq!(summary.bytes, 7 + 5 + 6 + 10 + 20 + 30);
        assert_eq!(summary.extensions[0], (".log".to_string(), 2));
        // root, docs/, docs/api/, logs/, logs/2024/
        assert_eq!(summary.directories, 5);
    }

    #[tokio::test]
    async fn test_probe_permissions() {
        let perms = session().probe_permissions().await;
        assert_eq!(
            perms,
            Permissions {
                list: true,
                read: true,
                stats: true
            }
        );
    }

    #[tokio::test]
    async fn test_background_jobs_publish_status() {
        let session = session();
        let mut crawl = session.crawl_status();
        let mut stats = session.stats_status();
        assert_eq!(*crawl.borrow(), CrawlStatus::Pending);

        session.spawn_warmup(3).await.unwrap();
        session.spawn_stats().await.unwrap();

        let crawl_state = crawl.borrow_and_update().clone();
        assert!(matches!(
            crawl_state,
            CrawlStatus::Complete { errors: 0, cached_prefixes, .. } if cached_prefixes > 0
        ));
        assert!(matches!(
            &*stats.borrow_and_update(),
            StatsStatus::Ready(s) if s.get("Backend") == Some("memory")
        ));
        assert!(session.cache().get("docs/").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_persists_cache() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_cache_dir(dir.path());
        let store = memory();

        let session = Session::new(store.clone(), config.clone());
        session.list("docs/", SortKey::Name).await.unwrap();
        let path = session.shutdown().unwrap().unwrap();
        assert!(path.exists());
        assert!(session.cancel_flag().is_cancelled());

        let reopened = Session::new(store, config);
        assert!(reopened.cache().get("docs/").is_some());
    }
}
