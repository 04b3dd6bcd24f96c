//! Aggregation of several named stores under one root.
//!
//! The root lists the store names as directories. Every other key starts
//! with a root name, which selects the store the rest of the key goes to.

use super::{Listing, ObjectMetadata, PageToken, RemoteStore, StoreStats};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Routes requests to one of several named stores.
#[derive(Default)]
pub struct MultiRootStore {
    roots: BTreeMap<String, Arc<dyn RemoteStore>>,
}

impl std::fmt::Debug for MultiRootStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiRootStore")
            .field("roots", &self.roots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MultiRootStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name`. Names cannot be empty or contain `/`.
    pub fn add_root(
        &mut self,
        name: impl Into<String>,
        store: Arc<dyn RemoteStore>,
    ) -> Result<(), StoreError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::InvalidKey {
                key: name,
                reason: "root names must be non-empty and cannot contain '/'".to_string(),
            });
        }
        self.roots.insert(name, store);
        Ok(())
    }

    #[must_use]
    pub fn with_root(mut self, name: impl Into<String>, store: Arc<dyn RemoteStore>) -> Self {
        // Invalid names are dropped; use `add_root` to observe the error.
        if let Err(e) = self.add_root(name, store) {
            warn!(error = %e, "Root not added");
        }
        self
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Split `key` into its store and the remainder of the key.
    fn route<'k>(&self, key: &'k str) -> Result<(&Arc<dyn RemoteStore>, &'k str), StoreError> {
        let Some((root, rest)) = key.split_once('/') else {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key has no root segment".to_string(),
            });
        };
        let store = self.roots.get(root).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        Ok((store, rest))
    }
}

#[async_trait]
impl RemoteStore for MultiRootStore {
    fn identity(&self) -> String {
        let names: Vec<&str> = self.root_names().collect();
        format!("multi-{}", names.join("+"))
    }

    fn display_root(&self) -> String {
        "multi://".to_string()
    }

    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        token: Option<&PageToken>,
    ) -> Result<Listing, StoreError> {
        if prefix.is_empty() {
            let after = token.map(PageToken::as_str);
            let mut names = self
                .roots
                .keys()
                .filter(|name| after.is_none_or(|t| name.as_str() > t));
            let mut listing = Listing {
                directories: names.by_ref().take(limit).cloned().collect(),
                ..Listing::default()
            };
            if names.next().is_some() {
                listing.next_token = listing.directories.last().cloned().map(PageToken::new);
            }
            return Ok(listing);
        }

        let (store, rest) = self.route(prefix)?;
        store.list_page(rest, limit, token).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let (store, rest) = self.route(key)?;
        store.get_object(rest).await
    }

    async fn read_range(&self, key: &str, size: u64) -> Result<Vec<u8>, StoreError> {
        let (store, rest) = self.route(key)?;
        store.read_range(rest, size).await
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let (store, rest) = self.route(key)?;
        store.download(rest, local_path).await
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let (store, rest) = self.route(key)?;
        store.upload(local_path, rest).await
    }

    async fn get_metadata(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let (store, rest) = self.route(key)?;
        store.get_metadata(rest).await
    }

    async fn store_stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        stats.push("Backend", "multi");
        stats.push("Roots", self.roots.len().to_string());
        for (name, store) in &self.roots {
            stats.push(format!("Root {name}"), store.display_root());
        }
        Ok(stats)
    }
}
