//! Depth-bounded, concurrency-bounded traversal of a remote namespace.
//!
//! The crawler walks breadth first with an explicit frontier. Every prefix
//! of one level is listed through a pool of at most `concurrency` in-flight
//! requests, and the next level starts only once the whole current level has
//! resolved. Peak concurrency is therefore the pool size and depth is exact
//! no matter how the tree is shaped.
//!
//! Listings go through the [`NamespaceCache`]: a fresh record skips the
//! network call but is still expanded, a miss fetches and populates it.
//!
//! A prefix that fails to list is recorded in [`TraversalResult::errors`] and
//! simply not expanded. The walk itself never fails.
//!
//! # Depth
//!
//! The root listing is depth 1. A directory found by a listing at depth `d`
//! is recorded with depth `d` and listed only if `d < max_depth`.

mod tree;

pub use tree::{DirNode, DirTree, Usage};

use crate::cache::{CacheRecord, NamespaceCache};
use crate::cancel::CancelFlag;
use crate::error::StoreError;
use crate::path;
use crate::store::{FileEntry, RemoteStore};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Everything a walk discovered.
#[derive(Debug, Default)]
pub struct TraversalResult {
    /// Full key and entry of every file under a listed prefix.
    pub all_files: Vec<(String, FileEntry)>,
    /// Full prefix of every directory seen, with the depth it was found at.
    pub all_dirs: Vec<(String, usize)>,
    /// Sum of all file sizes.
    pub total_size: u64,
    /// Prefixes that were listed successfully.
    pub listed: Vec<String>,
    /// Prefixes whose listing failed, with the reason.
    pub errors: Vec<(String, StoreError)>,
    /// Listings answered from the cache.
    pub cache_hits: usize,
    /// The walk stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl TraversalResult {
    fn merge(&mut self, prefix: &str, record: &CacheRecord, depth: usize) -> Vec<String> {
        for file in &record.files {
            self.total_size += file.size;
            self.all_files
                .push((path::child_key(prefix, &file.name), file.clone()));
        }
        let children: Vec<String> = record
            .directories
            .iter()
            .map(|name| path::child_prefix(prefix, name))
            .collect();
        self.all_dirs
            .extend(children.iter().map(|child| (child.clone(), depth)));
        self.listed.push(prefix.to_string());
        children
    }

    fn progress(&self, depth: usize) -> WalkProgress {
        WalkProgress {
            files: self.all_files.len(),
            directories: self.all_dirs.len(),
            total_size: self.total_size,
            depth,
            listed: self.listed.len(),
            cache_hits: self.cache_hits,
        }
    }

    /// Whether every attempted listing succeeded and the walk ran to the end.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Running totals passed to a walk's progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkProgress {
    pub files: usize,
    pub directories: usize,
    pub total_size: u64,
    /// Depth of the listing just merged.
    pub depth: usize,
    pub listed: usize,
    pub cache_hits: usize,
}

/// Progress callback for [`Crawler::walk_with_progress`].
pub type WalkProgressFn<'a> = &'a (dyn Fn(&WalkProgress) + Send + Sync);

/// Concurrent namespace walker.
#[derive(Clone)]
pub struct Crawler {
    store: Arc<dyn RemoteStore>,
    cache: Arc<NamespaceCache>,
    cancel: CancelFlag,
}

impl Crawler {
    /// A crawler that does not cache listings.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            cache: Arc::new(NamespaceCache::disabled()),
            cancel: CancelFlag::new(),
        }
    }

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

    pub fn cache(&self) -> &Arc<NamespaceCache> {
        &self.cache
    }

    async fn list_prefix(&self, prefix: &str) -> Result<(Arc<CacheRecord>, bool), StoreError> {
        self.cache.get_or_fetch(self.store.as_ref(), prefix).await
    }

    /// Walk `root` down to `max_depth` with at most `concurrency` listings
    /// in flight.
    pub async fn walk(&self, root: &str, max_depth: usize, concurrency: usize) -> TraversalResult {
        self.walk_with_progress(root, max_depth, concurrency, None)
            .await
    }

    /// [`walk`](Self::walk) with a callback fired after each merged listing.
    ///
    /// A concurrency of 1 (or 0) walks depth first, one listing at a time.
    /// The resulting sets are the same either way; only the order differs.
    #[instrument(level = "debug", skip(self, progress))]
    pub async fn walk_with_progress(
        &self,
        root: &str,
        max_depth: usize,
        concurrency: usize,
        progress: Option<WalkProgressFn<'_>>,
    ) -> TraversalResult {
        let max_depth = max_depth.max(1);
        let result = if concurrency <= 1 {
            self.walk_sequential(root, max_depth, progress).await
        } else {
            self.walk_levels(root, max_depth, concurrency, progress)
                .await
        };
        debug!(
            files = result.all_files.len(),
            dirs = result.all_dirs.len(),
            total_size = result.total_size,
            errors = result.errors.len(),
            cache_hits = result.cache_hits,
            cancelled = result.cancelled,
            "Walk finished"
        );
        result
    }

    async fn walk_levels(
        &self,
        root: &str,
        max_depth: usize,
        concurrency: usize,
        progress: Option<WalkProgressFn<'_>>,
    ) -> TraversalResult {
        let mut result = TraversalResult::default();
        let mut frontier = vec![root.to_string()];
        let mut depth = 1;

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            trace!(depth, prefixes = frontier.len(), "Listing level");

            let level = std::mem::take(&mut frontier);
            let mut listings = stream::iter(level)
                .map(|prefix| async move {
                    if self.cancel.is_cancelled() {
                        return (prefix, None);
                    }
                    let outcome = self.list_prefix(&prefix).await;
                    (prefix, Some(outcome))
                })
                .buffer_unordered(concurrency);

            // Barrier: the next frontier is only walked once this drains.
            while let Some((prefix, outcome)) = listings.next().await {
                match outcome {
                    None => result.cancelled = true,
                    Some(Ok((record, hit))) => {
                        if hit {
                            result.cache_hits += 1;
                        }
                        let children = result.merge(&prefix, &record, depth);
                        if depth < max_depth {
                            frontier.extend(children);
                        }
                        if let Some(cb) = progress {
                            cb(&result.progress(depth));
                        }
                    }
                    Some(Err(e)) => {
                        warn!(prefix = %prefix, error = %e, "Listing failed, branch skipped");
                        result.errors.push((prefix, e));
                    }
                }
            }
            depth += 1;
        }
        result
    }

    async fn walk_sequential(
        &self,
        root: &str,
        max_depth: usize,
        progress: Option<WalkProgressFn<'_>>,
    ) -> TraversalResult {
        let mut result = TraversalResult::default();
        let mut stack = vec![(root.to_string(), 1usize)];

        while let Some((prefix, depth)) = stack.pop() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            match self.list_prefix(&prefix).await {
                Ok((record, hit)) => {
                    if hit {
                        result.cache_hits += 1;
                    }
                    let children = result.merge(&prefix, &record, depth);
                    if depth < max_depth {
                        // Reversed so the smallest name is listed next.
                        stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
                    }
                    if let Some(cb) = progress {
                        cb(&result.progress(depth));
                    }
                }
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "Listing failed, branch skipped");
                    result.errors.push((prefix, e));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new("crawl");
        store.insert("r.txt", vec![0; 100]);
        store.insert("a/x.txt", vec![0; 10]);
        store.insert("a/deep/z.txt", vec![0; 5]);
        store.insert("b/y.txt", vec![0; 20]);
        Arc::new(store)
    }

    fn keys(result: &TraversalResult) -> Vec<&str> {
        let mut keys: Vec<&str> = result.all_files.iter().map(|(k, _)| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let crawler = Crawler::new(store());

        let shallow = crawler.walk("", 1, 4).await;
        assert_eq!(keys(&shallow), ["r.txt"]);
        assert_eq!(shallow.all_dirs, [("a/".to_string(), 1), ("b/".to_string(), 1)]);

        let two = crawler.walk("", 2, 4).await;
        assert_eq!(keys(&two), ["a/x.txt", "b/y.txt", "r.txt"]);
        assert_eq!(two.total_size, 130);
        assert!(two.all_dirs.contains(&("a/deep/".to_string(), 2)));

        let all = crawler.walk("", 10, 4).await;
        assert_eq!(all.total_size, 135);
        assert!(all.is_complete());
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let crawler = Crawler::new(store());
        let seq = crawler.walk("", 3, 1).await;
        let par = crawler.walk("", 3, 8).await;
        assert_eq!(keys(&seq), keys(&par));
        assert_eq!(seq.total_size, par.total_size);

        let mut seq_dirs = seq.all_dirs.clone();
        let mut par_dirs = par.all_dirs.clone();
        seq_dirs.sort();
        par_dirs.sort();
        assert_eq!(seq_dirs, par_dirs);
    }

    #[tokio::test]
    async fn test_walk_from_subprefix() {
        let crawler = Crawler::new(store());
        let result = crawler.walk("a/", 5, 4).await;
        assert_eq!(keys(&result), ["a/deep/z.txt", "a/x.txt"]);
    }

    #[tokio::test]
    async fn test_cached_walk_skips_listings() {
        let cache = Arc::new(NamespaceCache::with_defaults());
        let crawler = Crawler::new(store()).with_cache(Arc::clone(&cache));

        let first = crawler.walk("", 3, 4).await;
        assert_eq!(first.cache_hits, 0);
        assert_eq!(cache.len(), first.listed.len());

        let second = crawler.walk("", 3, 4).await;
        assert_eq!(second.cache_hits, second.listed.len());
        assert_eq!(keys(&first), keys(&second));
    }

    #[tokio::test]
    async fn test_progress_reports_running_totals() {
        let crawler = Crawler::new(store());
        let calls = AtomicUsize::new(0);
        let cb = |p: &WalkProgress| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(p.listed >= 1);
        };
        let result = crawler.walk_with_progress("", 3, 4, Some(&cb)).await;
        assert_eq!(calls.load(Ordering::SeqCst), result.listed.len());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let crawler = Crawler::new(store()).with_cancel(cancel);
        let result = crawler.walk("", 3, 4).await;
        assert!(result.cancelled);
        assert!(result.all_files.is_empty());
    }
}
