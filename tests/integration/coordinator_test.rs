//! Lease exclusivity of the in-memory coordinator.

use async_trait::async_trait;
use parking_lot::Mutex;
use sf_error::Result;
use sf_memory::{InMemoryCoordinator, PartitionStatus};
use sf_traits::{PartitionCreationSupplier, SourceCoordinator};
use sf_types::{GlobalScanState, PartitionIdentifier, PartitionKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Supplier with nothing new to offer.
struct NoNewPartitions;

#[async_trait]
impl PartitionCreationSupplier for NoNewPartitions {
    async fn apply(&self, _state: &mut GlobalScanState) -> Result<Vec<PartitionIdentifier>> {
        Ok(Vec::new())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_share_a_lease() {
    let coordinator = InMemoryCoordinator::new();
    let keys: Vec<PartitionKey> = (0..50).map(|i| PartitionKey::for_object("data", &format!("obj-{i}"))).collect();
    coordinator.create_partitions(keys.clone());

    let held: Arc<Mutex<HashSet<PartitionKey>>> = Arc::default();
    let processed: Arc<Mutex<Vec<PartitionKey>>> = Arc::default();

    let workers = (0..4).map(|i| {
        let worker = coordinator.for_owner(format!("worker-{i}"));
        let held = held.clone();
        let processed = processed.clone();
        tokio::spawn(async move {
            while let Some(partition) = worker.get_next_partition(&NoNewPartitions, false).await.unwrap() {
                assert!(
                    held.lock().insert(partition.key.clone()),
                    "{} handed out twice",
                    partition.key
                );
                tokio::time::sleep(Duration::from_millis(1)).await;
                held.lock().remove(&partition.key);
                processed.lock().push(partition.key.clone());
                worker.complete_partition(&partition.key, false).await.unwrap();
            }
        })
    });
    for result in futures::future::join_all(workers).await {
        result.unwrap();
    }

    let mut processed = processed.lock().clone();
    processed.sort();
    let mut expected = keys;
    expected.sort();
    assert_eq!(processed, expected);
    assert_eq!(coordinator.partitions_with_status(PartitionStatus::Completed).len(), 50);
}

#[tokio::test]
async fn test_given_up_partition_is_claimed_by_another_worker() {
    let coordinator = InMemoryCoordinator::new();
    let key = PartitionKey::for_object("data", "only.json");
    coordinator.create_partitions([key.clone()]);

    let first = coordinator.for_owner("worker-1");
    let second = coordinator.for_owner("worker-2");

    let claimed = first.get_next_partition(&NoNewPartitions, false).await.unwrap().unwrap();
    assert_eq!(claimed.key, key);
    assert!(second.get_next_partition(&NoNewPartitions, false).await.unwrap().is_none());

    // Only the owner may complete.
    assert!(second.complete_partition(&key, false).await.unwrap_err().is_lease_error());

    first.give_up_partition(&key, None).await.unwrap();
    let reclaimed = second.get_next_partition(&NoNewPartitions, false).await.unwrap().unwrap();
    assert_eq!(reclaimed.key, key);
    assert_eq!(coordinator.owner_of(&key).as_deref(), Some("worker-2"));
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() {
    let coordinator = InMemoryCoordinator::new();
    let key = PartitionKey::for_object("data", "slow.json");
    coordinator.create_partitions([key.clone()]);

    let stalled = coordinator.for_owner("worker-1");
    stalled.get_next_partition(&NoNewPartitions, false).await.unwrap().unwrap();
    coordinator.expire_leases_of("worker-1");

    let rescuer = coordinator.for_owner("worker-2");
    let partition = rescuer.get_next_partition(&NoNewPartitions, false).await.unwrap().unwrap();
    assert_eq!(partition.key, key);

    // The stalled worker lost ownership.
    assert!(stalled.renew_partition_ownership(&key).await.unwrap_err().is_lease_error());
}
