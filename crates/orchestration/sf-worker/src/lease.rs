//! Lease operations on one claimed partition.

use chrono::{DateTime, Utc};
use sf_error::{Result, SfError};
use sf_metrics::SourceMetrics;
use sf_traits::SourceCoordinator;
use sf_types::{PartitionKey, PartitionProgressState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a request to complete a partition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    /// The coordinator rejected the completion and the partition was given up
    GivenUp,
    /// Neither completion nor give-up was accepted; lease expiry releases it
    Failed,
}

/// A partition this worker claimed, with the coordinator that leased it.
///
/// Terminal operations (complete, give up, delete) never fail the caller.
/// A completion the coordinator rejects with a lease error falls back to
/// giving the partition up so another worker can claim it.
#[derive(Clone)]
pub struct PartitionLease {
    coordinator: Arc<dyn SourceCoordinator>,
    key: PartitionKey,
    metrics: Arc<SourceMetrics>,
}

impl PartitionLease {
    pub fn new(coordinator: Arc<dyn SourceCoordinator>, key: PartitionKey, metrics: Arc<SourceMetrics>) -> Self {
        Self {
            coordinator,
            key,
            metrics,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub async fn complete(&self, checkpointed_via_renewal: bool) -> CompletionOutcome {
        match self
            .coordinator
            .complete_partition(&self.key, checkpointed_via_renewal)
            .await
        {
            Ok(()) => {
                self.metrics.partitions_completed.increment();
                debug!(partition = %self.key, "Completed partition");
                CompletionOutcome::Completed
            }
            Err(e) if e.is_lease_error() => {
                self.metrics.partition_ownership_update_errors.increment();
                warn!(
                    partition = %self.key,
                    error = %e,
                    "Coordinator rejected completion, giving up partition; data may be duplicated"
                );
                if self.give_up(None).await {
                    CompletionOutcome::GivenUp
                } else {
                    CompletionOutcome::Failed
                }
            }
            Err(e) => {
                warn!(
                    partition = %self.key,
                    error = %e,
                    "Failed to complete partition, it may be processed again"
                );
                CompletionOutcome::Failed
            }
        }
    }

    /// Returns whether the coordinator accepted the give-up.
    pub async fn give_up(&self, retry_not_before: Option<DateTime<Utc>>) -> bool {
        match self.coordinator.give_up_partition(&self.key, retry_not_before).await {
            Ok(()) => {
                self.metrics.partitions_given_up.increment();
                debug!(partition = %self.key, "Gave up partition");
                true
            }
            Err(e) => {
                warn!(partition = %self.key, error = %e, "Failed to give up partition");
                false
            }
        }
    }

    pub async fn delete(&self) {
        match self.coordinator.delete_partition(&self.key).await {
            Ok(()) => {
                self.metrics.partitions_deleted.increment();
                info!(partition = %self.key, "Deleted partition");
            }
            Err(e) => warn!(partition = %self.key, error = %e, "Failed to delete partition"),
        }
    }

    pub async fn save_progress(&self, state: &PartitionProgressState) -> Result<()> {
        self.coordinator.save_progress_state(&self.key, state).await
    }

    /// Renew ownership from a progress check. Failures are counted, never raised.
    pub async fn renew_from_progress_check(&self) {
        if let Err(e) = self.coordinator.renew_partition_ownership(&self.key).await {
            self.metrics.partition_ownership_update_errors.increment();
            debug!(
                partition = %self.key,
                error = %e,
                "Failed to renew partition ownership in progress check"
            );
        }
    }

    /// Extend the lease to cover the acknowledgement wait.
    pub async fn prepare_acknowledgment_wait(&self, timeout: Duration) {
        if let Err(e) = self
            .coordinator
            .update_partition_for_acknowledgment_wait(&self.key, timeout)
            .await
        {
            log_lease_error(&self.key, &e, "Failed to update partition for acknowledgment wait");
        }
    }
}

fn log_lease_error(key: &PartitionKey, error: &SfError, message: &str) {
    if error.is_lease_error() {
        debug!(partition = %key, error = %error, "{message}");
    } else {
        warn!(partition = %key, error = %error, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sf_memory::{InMemoryCoordinator, PartitionStatus};
    use sf_traits::PartitionCreationSupplier;
    use sf_types::{GlobalScanState, PartitionIdentifier};

    struct OneKey;

    #[async_trait]
    impl PartitionCreationSupplier for OneKey {
        async fn apply(&self, _state: &mut GlobalScanState) -> Result<Vec<PartitionIdentifier>> {
            Ok(vec![PartitionKey::for_object("b", "k")])
        }
    }

    #[tokio::test]
    async fn test_complete_counts_and_terminal() {
        let coordinator = InMemoryCoordinator::new();
        let metrics = Arc::new(SourceMetrics::noop());
        let partition = coordinator.get_next_partition(&OneKey, false).await.unwrap().unwrap();

        let lease = PartitionLease::new(Arc::new(coordinator.clone()), partition.key.clone(), metrics.clone());
        assert_eq!(lease.complete(false).await, CompletionOutcome::Completed);

        assert_eq!(coordinator.status(&partition.key), Some(PartitionStatus::Completed));
        assert_eq!(metrics.partitions_completed.get(), 1);

        // The partition is no longer leased, so a later give-up is refused.
        assert!(!lease.give_up(None).await);
        assert_eq!(metrics.partitions_given_up.get(), 0);
    }

    #[tokio::test]
    async fn test_rejected_complete_falls_back_to_give_up() {
        let coordinator = InMemoryCoordinator::new();
        let metrics = Arc::new(SourceMetrics::noop());
        let partition = coordinator.get_next_partition(&OneKey, false).await.unwrap().unwrap();

        // The lease moves to another worker before completion.
        coordinator.expire_leases_of(coordinator.owner_id());
        let other = coordinator.for_owner("worker-1");
        other.get_next_partition(&OneKey, false).await.unwrap().unwrap();

        let lease = PartitionLease::new(Arc::new(coordinator.clone()), partition.key.clone(), metrics.clone());
        assert_eq!(lease.complete(true).await, CompletionOutcome::Failed);
        assert_eq!(metrics.partition_ownership_update_errors.get(), 1);
        assert_eq!(metrics.partitions_completed.get(), 0);
        assert_eq!(other.owner_of(&partition.key).as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_renewal_failure_is_counted() {
        let coordinator = InMemoryCoordinator::new();
        let metrics = Arc::new(SourceMetrics::noop());
        let lease = PartitionLease::new(
            Arc::new(coordinator),
            PartitionKey::for_object("b", "never-created"),
            metrics.clone(),
        );

        lease.renew_from_progress_check().await;
        lease.prepare_acknowledgment_wait(Duration::from_secs(60)).await;

        assert_eq!(metrics.partition_ownership_update_errors.get(), 1);
    }
}
