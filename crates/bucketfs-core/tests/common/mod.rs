//! Shared fixtures for the integration tests.
//!
//! [`FlakyStore`] wraps a [`MemoryStore`] and lets a test inject failures,
//! add latency and observe how many calls were made and how many ran at
//! once.

#![allow(dead_code)]

use async_trait::async_trait;
use bucketfs_core::store::{
    Listing, MemoryStore, ObjectMetadata, PageToken, RemoteStore, StoreStats,
};
use bucketfs_core::StoreError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Send `tracing` output to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// The three-object tree used across tests:
///
/// ```text
/// r.txt      100 B
/// a/x.txt     10 B
/// b/y.txt     20 B
/// ```
pub fn small_tree() -> MemoryStore {
    let store = MemoryStore::new("small");
    store.insert("r.txt", vec![b'r'; 100]);
    store.insert("a/x.txt", vec![b'x'; 10]);
    store.insert("b/y.txt", vec![b'y'; 20]);
    store
}

/// `width` directories per level down to `depth`, one file in each.
pub fn wide_tree(width: usize, depth: usize) -> MemoryStore {
    let store = MemoryStore::new("wide");
    let mut level = vec![String::new()];
    for _ in 0..depth {
        let mut next = Vec::new();
        for prefix in &level {
            for i in 0..width {
                let dir = format!("{prefix}d{i}/");
                store.insert(format!("{dir}f.bin"), vec![0; 4]);
                next.push(dir);
            }
        }
        level = next;
    }
    store
}

#[derive(Default)]
struct Counters {
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

/// Tracks one in-flight call for the high-water mark.
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.high_water.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`MemoryStore`] with injectable failures and call accounting.
pub struct FlakyStore {
    inner: MemoryStore,
    failing_prefixes: Mutex<HashSet<String>>,
    failing_keys: Mutex<HashSet<String>>,
    delay: Duration,
    counters: Counters,
    /// Prefixes in the order their listings started.
    list_log: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_prefixes: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            counters: Counters::default(),
            list_log: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Make every listing of `prefix` fail with access denied.
    pub fn fail_prefix(&self, prefix: &str) {
        self.failing_prefixes.lock().insert(prefix.to_string());
    }

    /// Make reads and downloads of `key` fail with a transient error.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.counters.download_calls.load(Ordering::SeqCst)
    }

    /// Most calls observed running at the same time.
    pub fn high_water(&self) -> usize {
        self.counters.high_water.load(Ordering::SeqCst)
    }

    pub fn list_log(&self) -> Vec<String> {
        self.list_log.lock().clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        if self.failing_keys.lock().contains(key) {
            return Err(StoreError::transient(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    fn identity(&self) -> String {
        format!("flaky-{}", self.inner.identity())
    }

    fn display_root(&self) -> String {
        self.inner.display_root()
    }

    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_log.lock().push(prefix.to_string());
        let _guard = InFlight::enter(&self.counters);
        self.pause().await;
        if self.failing_prefixes.lock().contains(prefix) {
            return Err(StoreError::AccessDenied {
                key: prefix.to_string(),
            });
        }
        self.inner.list_page(prefix, limit, token).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check_key(key)?;
        self.inner.get_object(key).await
    }

    async fn read_range(&self, key: &str, size: u64) -> Result<Vec<u8>, StoreError> {
        self.check_key(key)?;
        self.inner.read_range(key, size).await
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        self.counters.download_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.pause().await;
        self.check_key(key)?;
        self.inner.download(key, local_path).await
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        self.inner.upload(local_path, key).await
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        self.check_key(key)?;
        self.inner.get_metadata(key).await
    }

    async fn store_stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.store_stats().await
    }
}
