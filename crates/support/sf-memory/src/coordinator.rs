//! In-process lease coordinator.
//!
//! One [`InMemoryCoordinator`] per worker, all sharing a single partition
//! table. Ownership is tracked per owner id so several workers in the same
//! process contend for partitions exactly like they would against a shared
//! coordination store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sf_error::{CoordinatorError, Result, SfError};
use sf_traits::{PartitionCreationSupplier, SourceCoordinator};
use sf_types::{GlobalScanState, PartitionIdentifier, PartitionKey, PartitionProgressState, SourcePartition};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default lease granted by `get_next_partition` and renewals.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10 * 60);

/// Lifecycle of a stored partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Unassigned,
    Assigned,
    Completed,
}

#[derive(Debug, Clone)]
struct PartitionItem {
    status: PartitionStatus,
    owner: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    progress_state: Option<PartitionProgressState>,
    available_at: DateTime<Utc>,
    sequence: u64,
}

impl PartitionItem {
    fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            PartitionStatus::Unassigned => self.available_at <= now,
            PartitionStatus::Assigned => self.lease_expires_at.is_some_and(|expiry| expiry <= now),
            PartitionStatus::Completed => false,
        }
    }
}

struct CoordinationStore {
    partitions: Mutex<BTreeMap<PartitionKey, PartitionItem>>,
    global_state: Mutex<GlobalScanState>,
    supplier_lock: tokio::sync::Mutex<()>,
    next_sequence: AtomicU64,
    lease_duration: Duration,
}

/// Lease coordinator backed by a process-local partition table.
#[derive(Clone)]
pub struct InMemoryCoordinator {
    store: Arc<CoordinationStore>,
    owner_id: String,
}

impl InMemoryCoordinator {
    /// Fresh table with the default lease duration, owned by `worker-0`.
    pub fn new() -> Self {
        Self::with_lease_duration(DEFAULT_LEASE_DURATION)
    }

    pub fn with_lease_duration(lease_duration: Duration) -> Self {
        Self {
            store: Arc::new(CoordinationStore {
                partitions: Mutex::new(BTreeMap::new()),
                global_state: Mutex::new(GlobalScanState::default()),
                supplier_lock: tokio::sync::Mutex::new(()),
                next_sequence: AtomicU64::new(0),
                lease_duration,
            }),
            owner_id: "worker-0".to_string(),
        }
    }

    /// A handle on the same table acting as a different owner.
    pub fn for_owner(&self, owner_id: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            owner_id: owner_id.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Create partitions that do not exist yet. Returns how many were created.
    pub fn create_partitions(&self, keys: impl IntoIterator<Item = PartitionIdentifier>) -> usize {
        let now = Utc::now();
        let mut partitions = self.store.partitions.lock();
        let mut created = 0;
        for key in keys {
            if partitions.contains_key(&key) {
                continue;
            }
            let sequence = self.store.next_sequence.fetch_add(1, Ordering::Relaxed);
            trace!(partition = %key, "Creating partition");
            partitions.insert(
                key,
                PartitionItem {
                    status: PartitionStatus::Unassigned,
                    owner: None,
                    lease_expires_at: None,
                    progress_state: None,
                    available_at: now,
                    sequence,
                },
            );
            created += 1;
        }
        created
    }

    pub fn status(&self, key: &PartitionKey) -> Option<PartitionStatus> {
        self.store.partitions.lock().get(key).map(|item| item.status)
    }

    pub fn owner_of(&self, key: &PartitionKey) -> Option<String> {
        self.store.partitions.lock().get(key).and_then(|item| item.owner.clone())
    }

    pub fn progress_state(&self, key: &PartitionKey) -> Option<PartitionProgressState> {
        self.store
            .partitions
            .lock()
            .get(key)
            .and_then(|item| item.progress_state.clone())
    }

    pub fn lease_expiry(&self, key: &PartitionKey) -> Option<DateTime<Utc>> {
        self.store.partitions.lock().get(key).and_then(|item| item.lease_expires_at)
    }

    pub fn partition_count(&self) -> usize {
        self.store.partitions.lock().len()
    }

    /// Keys with the given status, in key order.
    pub fn partitions_with_status(&self, status: PartitionStatus) -> Vec<PartitionKey> {
        self.store
            .partitions
            .lock()
            .iter()
            .filter(|(_, item)| item.status == status)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot of the global scan state.
    pub fn global_state(&self) -> GlobalScanState {
        self.store.global_state.lock().clone()
    }

    /// Expire every lease held by `owner_id`, as if that worker had died.
    pub fn expire_leases_of(&self, owner_id: &str) {
        let expired = Utc::now() - chrono::Duration::seconds(1);
        for item in self.store.partitions.lock().values_mut() {
            if item.status == PartitionStatus::Assigned && item.owner.as_deref() == Some(owner_id) {
                item.lease_expires_at = Some(expired);
            }
        }
    }

    fn try_acquire(&self) -> Option<SourcePartition> {
        let now = Utc::now();
        let mut partitions = self.store.partitions.lock();
        let (key, item) = partitions
            .iter_mut()
            .filter(|(_, item)| item.is_available(now))
            .min_by_key(|(_, item)| (item.available_at, item.sequence))?;

        item.status = PartitionStatus::Assigned;
        item.owner = Some(self.owner_id.clone());
        item.lease_expires_at = Some(now + self.lease());

        debug!(partition = %key, owner = %self.owner_id, "Acquired partition");
        Some(SourcePartition {
            key: key.clone(),
            progress_state: item.progress_state.clone(),
        })
    }

    fn with_owned<T>(&self, key: &PartitionKey, f: impl FnOnce(&mut PartitionItem) -> T) -> Result<T> {
        let mut partitions = self.store.partitions.lock();
        let item = partitions
            .get_mut(key)
            .ok_or_else(|| SfError::partition_not_found(key.as_str()))?;
        if !self.owns(item) {
            return Err(SfError::partition_not_owned(key.as_str()));
        }
        Ok(f(item))
    }

    fn owns(&self, item: &PartitionItem) -> bool {
        item.status == PartitionStatus::Assigned && item.owner.as_deref() == Some(self.owner_id.as_str())
    }

    fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.store.lease_duration).unwrap_or_else(|_| chrono::Duration::days(365))
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceCoordinator for InMemoryCoordinator {
    async fn get_next_partition(
        &self,
        supplier: &dyn PartitionCreationSupplier,
        folder_partitions: bool,
    ) -> Result<Option<SourcePartition>> {
        if !folder_partitions {
            if let Some(partition) = self.try_acquire() {
                return Ok(Some(partition));
            }
        }

        // Only one owner runs the supplier at a time; the rest just try to
        // acquire whatever already exists.
        if let Ok(_guard) = self.store.supplier_lock.try_lock() {
            let mut state = self.store.global_state.lock().clone();
            let identifiers = supplier.apply(&mut state).await?;
            *self.store.global_state.lock() = state;

            let created = self.create_partitions(identifiers);
            if created > 0 {
                debug!(created, "Supplier created partitions");
            }
        }

        Ok(self.try_acquire())
    }

    async fn complete_partition(&self, key: &PartitionKey, checkpointed_via_renewal: bool) -> Result<()> {
        self.with_owned(key, |item| {
            item.status = PartitionStatus::Completed;
            item.owner = None;
            item.lease_expires_at = None;
        })?;
        debug!(partition = %key, checkpointed_via_renewal, "Completed partition");
        Ok(())
    }

    async fn give_up_partition(
        &self,
        key: &PartitionKey,
        retry_not_before: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.with_owned(key, |item| {
            item.status = PartitionStatus::Unassigned;
            item.owner = None;
            item.lease_expires_at = None;
            item.available_at = retry_not_before.unwrap_or_else(Utc::now);
        })?;
        debug!(partition = %key, "Gave up partition");
        Ok(())
    }

    async fn delete_partition(&self, key: &PartitionKey) -> Result<()> {
        // Checked and removed under one guard so a lease taken over in
        // between is never deleted.
        let mut partitions = self.store.partitions.lock();
        match partitions.get(key) {
            None => return Err(SfError::partition_not_found(key.as_str())),
            Some(item) if !self.owns(item) => return Err(SfError::partition_not_owned(key.as_str())),
            Some(_) => {
                partitions.remove(key);
            }
        }
        drop(partitions);
        debug!(partition = %key, "Deleted partition");
        Ok(())
    }

    async fn renew_partition_ownership(&self, key: &PartitionKey) -> Result<()> {
        let lease = self.lease();
        self.with_owned(key, |item| {
            item.lease_expires_at = Some(Utc::now() + lease);
        })
    }

    async fn save_progress_state(&self, key: &PartitionKey, state: &PartitionProgressState) -> Result<()> {
        let lease = self.lease();
        self.with_owned(key, |item| {
            item.progress_state = Some(state.clone());
            item.lease_expires_at = Some(Utc::now() + lease);
        })
    }

    async fn update_partition_for_acknowledgment_wait(
        &self,
        key: &PartitionKey,
        timeout: Duration,
    ) -> Result<()> {
        let extension = chrono::Duration::from_std(timeout)
            .map_err(|e| CoordinatorError::PartitionUpdate(format!("{key}: {e}")))?;
        self.with_owned(key, |item| {
            item.lease_expires_at = Some(Utc::now() + extension);
        })
    }
}
