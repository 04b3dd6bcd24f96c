//! Integration tests for the parallel transfer executor.

mod common;

use bucketfs_core::transfer::SkipReason;
use bucketfs_core::{TransferExecutor, TransferItem, TransferOptions};
use common::{FlakyStore, small_tree};
use parking_lot::Mutex;
use std::time::Duration;
use tempfile::TempDir;

fn small_items() -> Vec<TransferItem> {
    vec![
        TransferItem::new("r.txt", 100),
        TransferItem::new("a/x.txt", 10),
        TransferItem::new("b/y.txt", 20),
    ]
}

#[tokio::test]
async fn test_one_failure_does_not_abort_batch() {
    common::init_tracing();
    let store = FlakyStore::new(small_tree());
    store.fail_key("a/x.txt");
    let store = store.into_shared();
    let dest = TempDir::new().unwrap();

    let completions = Mutex::new(Vec::new());
    let progress = |done: usize, total: usize, key: &str| {
        completions.lock().push((done, total, key.to_string()));
    };
    let outcome = TransferExecutor::new(store.clone())
        .download(
            small_items(),
            dest.path(),
            &TransferOptions::default().with_concurrency(3),
            Some(&progress),
        )
        .await;

    assert_eq!(outcome.succeeded.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].0, "a/x.txt");
    assert!(!outcome.is_success());

    assert_eq!(std::fs::read(dest.path().join("r.txt")).unwrap().len(), 100);
    assert_eq!(
        std::fs::read(dest.path().join("b").join("y.txt")).unwrap().len(),
        20
    );
    assert!(!dest.path().join("a").join("x.txt").exists());

    let completions = completions.into_inner();
    assert_eq!(completions.len(), 3);
    assert!(completions.iter().all(|(_, total, _)| *total == 3));
    let mut counts: Vec<usize> = completions.iter().map(|(done, _, _)| *done).collect();
    counts.sort_unstable();
    assert_eq!(counts, [1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partitions_identical_for_any_pool_size() {
    common::init_tracing();
    for workers in [1, 3, 64] {
        let store = FlakyStore::new(small_tree()).into_shared();
        let dest = TempDir::new().unwrap();
        let items = vec![
            TransferItem::new("a/x.txt", 10),
            TransferItem::new("missing.txt", 5),
            TransferItem::new("b/y.txt", 20),
        ];

        let outcome = TransferExecutor::new(store.clone())
            .download(
                items,
                dest.path(),
                &TransferOptions::default().with_concurrency(workers),
                None,
            )
            .await;

        let mut succeeded: Vec<&str> = outcome.succeeded.iter().map(|(k, _)| k.as_str()).collect();
        succeeded.sort_unstable();
        let failed: Vec<&str> = outcome.errors.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(succeeded, ["a/x.txt", "b/y.txt"], "workers = {workers}");
        assert_eq!(failed, ["missing.txt"], "workers = {workers}");
        assert!(outcome.skipped.is_empty(), "workers = {workers}");
        assert_eq!(store.download_calls(), 3, "workers = {workers}");
    }
}

#[tokio::test]
async fn test_size_filter_skips_without_calling_store() {
    let store = FlakyStore::new(small_tree()).into_shared();
    let dest = TempDir::new().unwrap();

    let options = TransferOptions::default()
        .with_flat(true)
        .with_max_size(Some(15));
    let outcome = TransferExecutor::new(store.clone())
        .download(small_items(), dest.path(), &options, None)
        .await;

    assert_eq!(outcome.succeeded.len(), 1);
    assert_eq!(outcome.skipped.len(), 2);
    assert!(
        outcome
            .skipped
            .iter()
            .all(|(_, reason)| matches!(reason, SkipReason::ExceedsMaxSize { max: 15, .. }))
    );
    assert_eq!(store.download_calls(), 1);
    assert!(dest.path().join("x.txt").exists());
}

#[tokio::test(start_paused = true)]
async fn test_downloads_bounded_by_pool() {
    let store = common::wide_tree(12, 1);
    let store = FlakyStore::new(store)
        .with_delay(Duration::from_millis(10))
        .into_shared();
    let dest = TempDir::new().unwrap();
    let items: Vec<TransferItem> = (0..12)
        .map(|i| TransferItem::new(format!("d{i}/f.bin"), 4))
        .collect();

    let outcome = TransferExecutor::new(store.clone())
        .download(
            items,
            dest.path(),
            &TransferOptions::default().with_concurrency(3),
            None,
        )
        .await;

    assert_eq!(outcome.succeeded.len(), 12);
    assert!(store.high_water() <= 3);
    assert_eq!(store.download_calls(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_downloads_bounded_across_threads() {
    let store = FlakyStore::new(common::wide_tree(12, 1))
        .with_delay(Duration::from_millis(2))
        .into_shared();
    let dest = TempDir::new().unwrap();
    let items: Vec<TransferItem> = (0..12)
        .map(|i| TransferItem::new(format!("d{i}/f.bin"), 4))
        .collect();

    let outcome = TransferExecutor::new(store.clone())
        .download(
            items,
            dest.path(),
            &TransferOptions::default().with_concurrency(3),
            None,
        )
        .await;

    assert_eq!(outcome.succeeded.len(), 12);
    assert!(store.high_water() <= 3, "high water {}", store.high_water());
}

#[tokio::test]
async fn test_empty_batch() {
    let store = FlakyStore::new(small_tree()).into_shared();
    let dest = TempDir::new().unwrap();
    let outcome = TransferExecutor::new(store.clone())
        .download(Vec::new(), dest.path(), &TransferOptions::default(), None)
        .await;
    assert_eq!(outcome.total(), 0);
    assert!(outcome.is_success());
    assert_eq!(store.download_calls(), 0);
}
