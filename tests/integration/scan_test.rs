//! Scan workers end to end against the in-memory backends.

use chrono::Utc;
use sf_discovery::{ScanConfig, ScanPartitionSupplier};
use sf_memory::{InMemoryAcknowledgementSetManager, InMemoryCoordinator, InMemoryObjectStore, PartitionStatus};
use sf_metrics::SourceMetrics;
use sf_types::{FolderPartitioning, PartitionKey, ScanOptions};
use sf_worker::{DeliveryCoordinator, ObjectDeleter, ProcessingGate, ScanWorker};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{settle, RecordingHandler};

struct Source {
    coordinator: InMemoryCoordinator,
    store: Arc<InMemoryObjectStore>,
    handler: Arc<RecordingHandler>,
    metrics: Arc<SourceMetrics>,
    delivery: Arc<DeliveryCoordinator>,
    supplier: Arc<ScanPartitionSupplier>,
    scan: ScanConfig,
}

impl Source {
    /// Acknowledged delivery with delete-on-read.
    fn new(scan: ScanConfig) -> Self {
        let store = Arc::new(InMemoryObjectStore::new());
        let handler = Arc::new(RecordingHandler::default());
        let metrics = Arc::new(SourceMetrics::noop());
        let delivery = DeliveryCoordinator::new(handler.clone(), metrics.clone())
            .with_acknowledgements(Arc::new(InMemoryAcknowledgementSetManager::new()))
            .with_deleter(ObjectDeleter::new(store.clone(), metrics.clone()).with_retry(1, Duration::ZERO));

        Self {
            coordinator: InMemoryCoordinator::new(),
            supplier: Arc::new(ScanPartitionSupplier::new(store.clone(), scan.clone()).with_delete_on_read(true)),
            store,
            handler,
            metrics,
            delivery: Arc::new(delivery),
            scan,
        }
    }

    fn worker(&self, owner: &str) -> ScanWorker {
        ScanWorker::new(
            Arc::new(self.coordinator.for_owner(owner)),
            self.supplier.clone(),
            self.store.clone(),
            self.delivery.clone(),
            &self.scan,
        )
        .with_gate(ProcessingGate::new().without_env())
        .with_idle_wait(Duration::from_millis(1))
    }
}

#[tokio::test]
async fn test_every_discovered_object_is_delivered_and_deleted() {
    let source = Source::new(ScanConfig::new().with_bucket(ScanOptions::new("events")));
    for i in 0..6 {
        source
            .store
            .put_object("events", &format!("2024/01/{i:02}.json"), b"{}".to_vec(), Utc::now());
    }
    let workers = [source.worker("worker-0"), source.worker("worker-1")];

    for _ in 0..10 {
        for worker in &workers {
            worker.run_once().await.unwrap();
        }
        settle().await;
    }

    let mut keys = source.handler.keys();
    keys.sort();
    assert_eq!(keys, (0..6).map(|i| format!("2024/01/{i:02}.json")).collect::<Vec<_>>());
    assert_eq!(source.store.object_count("events"), 0);
    assert_eq!(source.metrics.objects_deleted.get(), 6);
    assert_eq!(source.coordinator.partitions_with_status(PartitionStatus::Completed).len(), 6);
}

#[tokio::test]
async fn test_folder_processed_across_leases() {
    let scan = ScanConfig::new()
        .with_bucket(ScanOptions::new("events").with_exclude_suffix(".tmp"))
        .with_folder_partitioning(FolderPartitioning::new(2, 2));
    let source = Source::new(scan);
    for i in 0..5 {
        source
            .store
            .put_object("events", &format!("app/a/{i}.json"), b"{}".to_vec(), Utc::now());
    }
    source.store.put_object("events", "app/a/partial.tmp", b"{}".to_vec(), Utc::now());
    let worker = source.worker("worker-0");
    let key = PartitionKey::for_folder("events", "app/a/");

    for _ in 0..6 {
        worker.run_once().await.unwrap();
        settle().await;
    }

    // Each object delivered exactly once, in key order, over three leases.
    assert_eq!(
        source.handler.keys(),
        (0..5).map(|i| format!("app/a/{i}.json")).collect::<Vec<_>>()
    );
    assert_eq!(source.coordinator.status(&key), Some(PartitionStatus::Completed));
    assert_eq!(source.metrics.partitions_given_up.get(), 2);
    assert!(source.store.contains("events", "app/a/partial.tmp"));
}

#[tokio::test]
async fn test_empty_folder_deleted_once_after_grace() {
    let grace = Duration::from_millis(300);
    let scan = ScanConfig::new()
        .with_bucket(ScanOptions::new("events"))
        .with_folder_partitioning(FolderPartitioning::new(1, 10).with_empty_folder_grace(grace));
    let source = Source::new(scan);
    let key = PartitionKey::for_folder("events", "drained/");
    source.coordinator.create_partitions([key.clone()]);
    let worker = source.worker("worker-0");

    assert!(worker.run_once().await.unwrap());
    let first = source.coordinator.progress_state(&key).unwrap().last_activity();

    // Inside the grace period the partition keeps coming back.
    for _ in 0..3 {
        assert!(worker.run_once().await.unwrap());
        assert_eq!(source.coordinator.status(&key), Some(PartitionStatus::Unassigned));
        let observed = source.coordinator.progress_state(&key).unwrap().last_activity();
        assert!(observed >= first);
    }
    assert_eq!(source.metrics.partitions_deleted.get(), 0);

    tokio::time::sleep(grace + Duration::from_millis(50)).await;

    assert!(worker.run_once().await.unwrap());
    assert_eq!(source.coordinator.status(&key), None);
    assert!(!worker.run_once().await.unwrap());
    assert_eq!(source.metrics.partitions_deleted.get(), 1);
    assert_eq!(source.metrics.folder_partition_no_objects_found.get(), 5);
}

#[tokio::test]
async fn test_paused_gate_claims_nothing() {
    let source = Source::new(ScanConfig::new().with_bucket(ScanOptions::new("events")));
    source.store.put_object("events", "a.json", b"{}".to_vec(), Utc::now());

    let gate = ProcessingGate::new().without_env().with_closed_wait(Duration::from_millis(5));
    gate.pause();
    let worker = Arc::new(source.worker("worker-0").with_gate(gate.clone()));

    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(source.handler.keys().is_empty());

    gate.resume();
    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.stop();
    running.await.unwrap().unwrap();

    assert_eq!(source.handler.keys(), vec!["a.json".to_string()]);
}
