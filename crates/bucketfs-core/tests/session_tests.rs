//! End-to-end tests of the session facade over real backends.

mod common;

use bucketfs_core::session::{CAT_CONFIRM_BYTES, DEFAULT_PEEK_BYTES};
use bucketfs_core::{
    Config, ErrorCategory, Glob, LocalStore, MemoryStore, MirrorOptions, MultiRootStore,
    SessionError, Session, SortKey, StoreError,
};
use common::{FlakyStore, small_tree};
use std::sync::Arc;
use tempfile::TempDir;

fn ephemeral() -> Config {
    Config::default().with_persist(false)
}

/// A local directory laid out like a small bucket.
fn local_bucket() -> (TempDir, Arc<LocalStore>) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("site/css")).unwrap();
    std::fs::create_dir_all(root.join("site/img/thumbs")).unwrap();
    std::fs::write(root.join("site/index.html"), b"<html></html>").unwrap();
    std::fs::write(root.join("site/css/main.css"), b"body {}").unwrap();
    std::fs::write(root.join("site/img/logo.png"), vec![0u8; 64]).unwrap();
    std::fs::write(root.join("site/img/thumbs/logo.png"), vec![0u8; 8]).unwrap();
    std::fs::write(root.join("notes.txt"), b"todo").unwrap();
    let store = Arc::new(LocalStore::open(root).unwrap());
    (dir, store)
}

#[tokio::test]
async fn test_navigation_over_local_store() {
    let (_dir, store) = local_bucket();
    let mut session = Session::new(store, ephemeral());

    let root = session.list("", SortKey::Name).await.unwrap();
    assert_eq!(root.directories, ["site"]);
    assert_eq!(root.files[0].name, "notes.txt");

    session.cd("site/img").await.unwrap();
    assert_eq!(session.current_prefix(), "site/img/");
    assert!(session.prompt().ends_with("/site/img/"));

    let (key, meta) = session.stat("logo.png").await.unwrap();
    assert_eq!(key, "site/img/logo.png");
    assert_eq!(meta.size, 64);
    assert_eq!(meta.content_type, "image/png");

    session.cd("..").await.unwrap();
    let (_, css) = session.read("css/main.css", Some(CAT_CONFIRM_BYTES)).await.unwrap();
    assert_eq!(css, b"body {}");
}

#[tokio::test]
async fn test_mirror_local_store_with_filters() {
    let (_dir, store) = local_bucket();
    let session = Session::new(store, ephemeral());
    let dest = TempDir::new().unwrap();

    let options = MirrorOptions {
        include: vec![Glob::new("*.png").unwrap(), Glob::new("*.css").unwrap()],
        exclude: vec![Glob::new("main.*").unwrap()],
        ..MirrorOptions::default()
    };
    let outcome = session
        .mirror("site", dest.path(), &options, None, None)
        .await;

    assert_eq!(outcome.plan.filtered, 2);
    let transfer = outcome.transfer.unwrap();
    assert!(transfer.is_success());
    assert_eq!(transfer.succeeded.len(), 2);
    assert!(dest.path().join("img/logo.png").exists());
    assert!(dest.path().join("img/thumbs/logo.png").exists());
    assert!(!dest.path().join("css/main.css").exists());
}

#[tokio::test]
async fn test_multi_root_session() {
    let photos = MemoryStore::new("photos");
    photos.insert("2024/a.jpg", vec![1; 3]);
    let logs = MemoryStore::new("logs");
    logs.insert("app.log", vec![2; 5]);

    let multi = MultiRootStore::new()
        .with_root("photos", Arc::new(photos))
        .with_root("logs", Arc::new(logs));
    let mut session = Session::new(Arc::new(multi), ephemeral());

    let root = session.list("", SortKey::Name).await.unwrap();
    assert_eq!(root.directories, ["logs", "photos"]);

    session.cd("photos/2024").await.unwrap();
    let (_, data) = session.read("a.jpg", None).await.unwrap();
    assert_eq!(data, [1, 1, 1]);

    let found = session.find("*", Some("/"), 5, None).await.unwrap();
    let keys: Vec<&str> = found.matches.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["logs/app.log", "photos/2024/a.jpg"]);
}

#[tokio::test]
async fn test_errors_map_to_categories() {
    let store = FlakyStore::new(small_tree());
    store.fail_prefix("b/");
    let mut session = Session::new(store.into_shared(), ephemeral());

    let err = session.list("b/", SortKey::Name).await.unwrap_err();
    assert_eq!(ErrorCategory::from(&err), ErrorCategory::PermissionDenied);

    let err = session.cd("missing").await.unwrap_err();
    assert_eq!(ErrorCategory::from(&err), ErrorCategory::NotFound);

    let err = session.read("nope.txt", None).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Store(StoreError::NotFound { .. })
    ));
    assert_eq!(ErrorCategory::from(&err), ErrorCategory::NotFound);

    let err = session.peek("r.txt", Some(0)).await.unwrap_err();
    assert_eq!(ErrorCategory::from(&err), ErrorCategory::InvalidArgument);

    let err = session.read("/", None).await.unwrap_err();
    assert_eq!(ErrorCategory::from(&err), ErrorCategory::InvalidArgument);
}

#[tokio::test]
async fn test_peek_defaults_and_truncation() {
    let store = MemoryStore::new("peek");
    store.insert("big.bin", vec![7; 5000]);
    store.insert("small.bin", vec![7; 10]);
    let session = Session::new(Arc::new(store), ephemeral());

    let (_, head) = session.peek("big.bin", None).await.unwrap();
    assert_eq!(head.len() as u64, DEFAULT_PEEK_BYTES);
    let (_, head) = session.peek("small.bin", Some(100)).await.unwrap();
    assert_eq!(head.len(), 10);
}

#[tokio::test]
async fn test_tree_usage_totals() {
    let session = Session::new(FlakyStore::new(small_tree()).into_shared(), ephemeral());
    let view = session.tree(None, 3, None).await;

    assert_eq!(view.tree.usage("").bytes, 130);
    assert_eq!(view.tree.usage("a/").files, 1);
    assert_eq!(view.tree.usage("b/").bytes, 20);
    assert!(view.walk.is_complete());
}
