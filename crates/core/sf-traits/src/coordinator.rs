//! Partition ownership coordinator and creation supplier traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sf_error::Result;
use sf_types::{GlobalScanState, PartitionIdentifier, PartitionKey, PartitionProgressState, SourcePartition};
use std::time::Duration;

/// Emits candidate partitions when the coordinator needs new work.
///
/// The coordinator owns `state` and persists it between invocations. An
/// implementation mutates it in place (watermarks, scan count) and returns
/// the identifiers of newly discovered work.
#[async_trait]
pub trait PartitionCreationSupplier: Send + Sync {
    async fn apply(&self, state: &mut GlobalScanState) -> Result<Vec<PartitionIdentifier>>;
}

/// Lease-based partition ownership.
///
/// A partition returned by [`get_next_partition`](SourceCoordinator::get_next_partition)
/// is owned by the caller until it calls
/// [`complete_partition`](SourceCoordinator::complete_partition),
/// [`give_up_partition`](SourceCoordinator::give_up_partition) or
/// [`delete_partition`](SourceCoordinator::delete_partition), or until the
/// lease expires. Every mutating call fails with a
/// [`CoordinatorError`](sf_error::CoordinatorError) when the caller no longer
/// owns the partition; callers treat that as a possible concurrent duplicate,
/// never as fatal.
#[async_trait]
pub trait SourceCoordinator: Send + Sync {
    /// Acquire the next available partition.
    ///
    /// When nothing is available the supplier is run and the partitions it
    /// returns are created if they do not exist yet. With `folder_partitions`
    /// the supplier is consulted on every call so new folders are discovered
    /// while existing ones are leased.
    async fn get_next_partition(
        &self,
        supplier: &dyn PartitionCreationSupplier,
        folder_partitions: bool,
    ) -> Result<Option<SourcePartition>>;

    /// Mark the partition done. `checkpointed_via_renewal` is true when the
    /// lease was kept alive through renewals while acknowledgements were pending.
    async fn complete_partition(&self, key: &PartitionKey, checkpointed_via_renewal: bool) -> Result<()>;

    /// Release the lease so the partition can be picked up again, not before
    /// `retry_not_before` when given.
    async fn give_up_partition(
        &self,
        key: &PartitionKey,
        retry_not_before: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Remove the partition permanently.
    async fn delete_partition(&self, key: &PartitionKey) -> Result<()>;

    /// Extend the lease by the coordinator's default lease duration.
    async fn renew_partition_ownership(&self, key: &PartitionKey) -> Result<()>;

    /// Persist progress and extend the lease.
    async fn save_progress_state(&self, key: &PartitionKey, state: &PartitionProgressState) -> Result<()>;

    /// Extend the lease to cover an acknowledgement wait of `timeout`.
    async fn update_partition_for_acknowledgment_wait(
        &self,
        key: &PartitionKey,
        timeout: Duration,
    ) -> Result<()>;
}
