//! Cached, concurrent filesystem view over flat object stores.
//!
//! Object stores only know keys. This crate layers a directory view on top
//! of any backend that can list a key prefix with a `/` delimiter, and keeps
//! that view fast by caching listings and fanning requests out over a
//! bounded worker pool.
//!
//! # Components
//!
//! - [`path`] - resolution of shell-style paths against a current prefix
//! - [`RemoteStore`] - the backend contract, with [`MemoryStore`],
//!   [`LocalStore`] and [`MultiRootStore`] implementations
//! - [`NamespaceCache`] - TTL cache of listings, optionally persisted to disk
//! - [`Crawler`] - breadth-first concurrent walks with a per-level barrier
//! - [`TransferExecutor`] - parallel downloads and uploads with per-item
//!   outcomes
//! - [`diff`] - text and binary comparison of two files
//! - [`Session`] - the facade a front end drives
//!
//! # Crawl order
//!
//! The crawler lists one depth level at a time. Every listing of a level
//! finishes before the next level starts and a cancelled walk stops on a
//! level boundary. Within a level up to `workers` listings run at once.
//!
//! # Example
//!
//! ```
//! use bucketfs_core::{Config, MemoryStore, Session, SortKey};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new("demo");
//! store.insert("photos/2024/beach.jpg", vec![0; 1024]);
//! store.insert("photos/2024/city.jpg", vec![0; 2048]);
//!
//! let mut session = Session::new(Arc::new(store), Config::default().with_persist(false));
//! session.cd("photos/2024").await?;
//! let listing = session.list(session.current_prefix(), SortKey::Size).await?;
//! assert_eq!(listing.files[0].name, "city.jpg");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod crawl;
pub mod diff;
pub mod error;
pub mod glob;
pub mod path;
pub mod session;
pub mod size;
pub mod store;
pub mod transfer;

pub use cache::{CacheRecord, CacheStats, NamespaceCache};
pub use cancel::CancelFlag;
pub use config::Config;
pub use crawl::{Crawler, DirTree, TraversalResult, WalkProgress};
pub use diff::{DiffReport, DiffSide};
pub use error::{
    CacheError, ConfigError, ErrorCategory, PathError, SessionError, StoreError, TransferError,
};
pub use glob::Glob;
pub use session::{CrawlStatus, MirrorOptions, Permissions, Session, StatsStatus};
pub use store::{
    FileEntry, Listing, LocalStore, MemoryStore, MultiRootStore, ObjectMetadata, PageToken,
    RemoteStore, SortKey, StoreStats,
};
pub use transfer::{TransferExecutor, TransferItem, TransferOptions, TransferOutcome};
