//! Scan discovery against the in-memory object store.

use chrono::{Duration as ChronoDuration, Utc};
use sf_discovery::{ScanConfig, ScanPartitionSupplier};
use sf_memory::InMemoryObjectStore;
use sf_traits::PartitionCreationSupplier;
use sf_types::{FolderPartitioning, GlobalScanState, PartitionKey, ScanOptions, ScanScheduling, ScanWindow};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_only_matching_objects_survive_filters() {
    let t1 = Utc::now() - ChronoDuration::hours(1);
    let t0 = t1 - ChronoDuration::hours(1);

    let store = Arc::new(InMemoryObjectStore::new());
    store.put_object("data", "a.csv", b"1".to_vec(), t0 + ChronoDuration::minutes(30));
    store.put_object("data", "b.invalid", b"2".to_vec(), t0 + ChronoDuration::minutes(30));
    store.put_object("data", "c.csv", b"3".to_vec(), t0 - ChronoDuration::minutes(1));
    store.put_object("data", "folder/", Vec::new(), t0 + ChronoDuration::minutes(30));
    store.put_object("data", "d.csv", b"4".to_vec(), t1);

    let scan = ScanConfig::new().with_bucket(
        ScanOptions::new("data")
            .with_exclude_suffix(".invalid")
            .with_window(ScanWindow::new().with_start_time(t0).with_end_time(t1)),
    );
    let supplier = ScanPartitionSupplier::new(store, scan);

    let mut state = GlobalScanState::new();
    let partitions = supplier.apply(&mut state).await.unwrap();

    assert_eq!(partitions, vec![PartitionKey::for_object("data", "a.csv")]);
    assert_eq!(state.scan_count, 1);
}

#[tokio::test]
async fn test_scheduled_scans_are_incremental() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.put_object("data", "first.json", b"{}".to_vec(), Utc::now() - ChronoDuration::hours(2));

    let scan = ScanConfig::new()
        .with_bucket(ScanOptions::new("data"))
        .with_scheduling(ScanScheduling::new(Duration::ZERO, 2));
    let supplier = ScanPartitionSupplier::new(store.clone(), scan);
    let mut state = GlobalScanState::new();

    let first = supplier.apply(&mut state).await.unwrap();
    assert_eq!(first, vec![PartitionKey::for_object("data", "first.json")]);

    store.put_object("data", "second.json", b"{}".to_vec(), Utc::now() - ChronoDuration::hours(1));
    let second = supplier.apply(&mut state).await.unwrap();
    assert_eq!(second, vec![PartitionKey::for_object("data", "second.json")]);

    // Scan count reached.
    store.put_object("data", "third.json", b"{}".to_vec(), Utc::now());
    assert!(supplier.apply(&mut state).await.unwrap().is_empty());
    assert_eq!(state.scan_count, 2);
}

#[tokio::test]
async fn test_folder_partitions_collapse_keys() {
    let store = Arc::new(InMemoryObjectStore::new());
    let now = Utc::now();
    for key in ["app/2024/a.json", "app/2024/b.json", "app/2025/c.json", "top.json"] {
        store.put_object("logs", key, b"{}".to_vec(), now);
    }

    let scan = ScanConfig::new()
        .with_bucket(ScanOptions::new("logs"))
        .with_folder_partitioning(FolderPartitioning::new(2, 10));
    let supplier = ScanPartitionSupplier::new(store, scan);

    let mut partitions = supplier.apply(&mut GlobalScanState::new()).await.unwrap();
    partitions.sort();

    assert_eq!(
        partitions,
        vec![
            PartitionKey::for_folder("logs", "app/2024/"),
            PartitionKey::for_folder("logs", "app/2025/"),
        ]
    );
}
