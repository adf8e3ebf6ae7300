//! Scan worker.
//!
//! Repeatedly claims the next partition from the coordinator and processes
//! it. Object partitions deliver one object; folder partitions deliver up to
//! `max_objects_per_lease` objects under a prefix and checkpoint the last
//! key so the next lease continues where this one stopped.

use chrono::Utc;
use futures::TryStreamExt;
use parking_lot::Mutex;
use sf_discovery::{list_all_objects, ScanConfig};
use sf_error::{classify_error, ErrorCategory, Result, SfError};
use sf_metrics::SourceMetrics;
use sf_traits::{ObjectStore, PartitionCreationSupplier, SourceCoordinator};
use sf_types::{
    BucketOwners, DataSelection, FolderPartitioning, ObjectReference, PartitionKey, PartitionProgressState,
    SourcePartition,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::delivery::{DeliveryCoordinator, PartitionAcknowledgements};
use crate::gate::ProcessingGate;
use crate::lease::{CompletionOutcome, PartitionLease};

/// Per-bucket settings the worker needs after a partition was claimed.
#[derive(Debug, Clone, Default)]
struct BucketSettings {
    selection: DataSelection,
    exclude_suffixes: Vec<String>,
}

/// Claims and processes scan partitions until stopped.
pub struct ScanWorker {
    coordinator: Arc<dyn SourceCoordinator>,
    supplier: Arc<dyn PartitionCreationSupplier>,
    store: Arc<dyn ObjectStore>,
    delivery: Arc<DeliveryCoordinator>,
    folders: Option<FolderPartitioning>,
    buckets: HashMap<String, BucketSettings>,
    owners: BucketOwners,
    gate: ProcessingGate,
    idle_wait: Duration,
    stopped: AtomicBool,

    /// Partitions whose acknowledgements are still outstanding
    held: Mutex<HashMap<PartitionKey, Arc<PartitionAcknowledgements>>>,
}

impl ScanWorker {
    pub fn new(
        coordinator: Arc<dyn SourceCoordinator>,
        supplier: Arc<dyn PartitionCreationSupplier>,
        store: Arc<dyn ObjectStore>,
        delivery: Arc<DeliveryCoordinator>,
        scan: &ScanConfig,
    ) -> Self {
        // A bucket listed more than once keeps its first settings.
        let mut buckets = HashMap::new();
        for options in &scan.buckets {
            buckets
                .entry(options.bucket.clone())
                .or_insert_with(|| BucketSettings {
                    selection: options.data_selection,
                    exclude_suffixes: options.exclude_suffixes.clone(),
                });
        }

        Self {
            coordinator,
            supplier,
            store,
            delivery,
            folders: scan.folder_partitioning,
            buckets,
            owners: BucketOwners::default(),
            gate: ProcessingGate::new(),
            idle_wait: Duration::from_secs(5),
            stopped: AtomicBool::new(false),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_bucket_owners(mut self, owners: BucketOwners) -> Self {
        self.owners = owners;
        self
    }

    pub fn with_gate(mut self, gate: ProcessingGate) -> Self {
        self.gate = gate;
        self
    }

    /// Sleep when the coordinator has nothing to hand out.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    fn metrics(&self) -> &Arc<SourceMetrics> {
        self.delivery.metrics()
    }

    /// Stop before the next claim.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Run until stopped. Only a fatal error ends the loop early.
    pub async fn run(&self) -> Result<()> {
        info!(folder_partitions = self.folders.is_some(), "Scan worker started");

        let mut result = Ok(());
        while !self.is_stopped() {
            if !self.gate.is_open() {
                debug!("Processing paused, not claiming partitions");
                tokio::time::sleep(self.gate.closed_wait()).await;
                continue;
            }

            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.idle_wait).await,
                Err(e) if classify_error(&e) == ErrorCategory::Fatal => {
                    error!(error = %e, "Scan worker stopping on fatal error");
                    result = Err(e);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to get next partition, backing off");
                    tokio::time::sleep(self.idle_wait).await;
                }
            }
        }

        self.give_up_held().await;
        info!("Scan worker stopped");
        result
    }

    /// Claim and process at most one partition. Returns whether one was claimed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(partition) = self
            .coordinator
            .get_next_partition(self.supplier.as_ref(), self.folders.is_some())
            .await?
        else {
            return Ok(false);
        };

        self.held.lock().retain(|_, pending| !pending.is_settled());

        let lease = PartitionLease::new(
            Arc::clone(&self.coordinator),
            partition.key.clone(),
            Arc::clone(self.metrics()),
        );
        match &self.folders {
            Some(folders) => self.process_folder(partition, lease, folders).await,
            None => self.process_object(&partition.key, lease).await,
        }
        Ok(true)
    }

    async fn process_object(&self, key: &PartitionKey, lease: PartitionLease) {
        let Some(reference) = key.to_object_reference() else {
            warn!(partition = %key, "Partition key does not name an object, giving it up");
            lease.give_up(None).await;
            return;
        };
        let owner = self.owners.owner_for(&reference.bucket).map(str::to_string);
        let reference = reference.with_owner_opt(owner);
        let selection = self.selection_for(&reference.bucket);

        let pending = self.track(&lease);
        let set = pending
            .as_ref()
            .and_then(|pending| self.delivery.open_partition_set(pending, &reference));

        let delivered = self.delivery.deliver(&reference, selection, set.as_ref()).await;

        match (delivered, pending) {
            (Ok(()), Some(pending)) => {
                lease
                    .prepare_acknowledgment_wait(self.delivery.acknowledgment_timeout())
                    .await;
                if let Some(set) = &set {
                    set.complete();
                }
                pending.release_owner(false).await;
            }
            (Ok(()), None) => {
                if lease.complete(false).await == CompletionOutcome::GivenUp {
                    debug!(partition = %key, "Partition released after rejected completion");
                }
            }
            (Err(e), pending) => {
                if let Some(pending) = pending {
                    pending.abandon();
                }
                if let Some(set) = &set {
                    set.complete();
                }
                self.on_object_error(&lease, &reference, e).await;
            }
        }
    }

    async fn on_object_error(&self, lease: &PartitionLease, reference: &ObjectReference, error: SfError) {
        match classify_error(&error) {
            ErrorCategory::NotFound => {
                warn!(object = %reference, "Object no longer exists, completing its partition");
                lease.complete(false).await;
            }
            _ => {
                error!(object = %reference, error = %error, "Failed to deliver object, giving up partition");
                lease.give_up(None).await;
            }
        }
    }

    async fn process_folder(&self, partition: SourcePartition, lease: PartitionLease, folders: &FolderPartitioning) {
        let Some((bucket, prefix)) = partition.key.split() else {
            warn!(partition = %partition.key, "Partition key does not name a folder, giving it up");
            lease.give_up(None).await;
            return;
        };
        let (bucket, prefix) = (bucket.to_string(), prefix.to_string());
        let owner = self.owners.owner_for(&bucket).map(str::to_string);
        let resume_after = partition
            .progress_state
            .as_ref()
            .and_then(|state| state.last_processed_key.clone());

        let keys = match self.list_folder(&bucket, &prefix, owner.as_deref(), resume_after.as_deref()).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(partition = %partition.key, error = %e, "Failed to list folder, giving up partition");
                lease.give_up(Some(Utc::now())).await;
                return;
            }
        };

        let now = Utc::now();
        if keys.is_empty() {
            self.on_empty_folder(&lease, partition.progress_state, folders).await;
            return;
        }

        let mut state = partition.progress_state.unwrap_or_else(|| PartitionProgressState::new(now));
        state.touch(now);

        let quota = folders.max_objects_per_lease;
        let quota_reached = keys.len() >= quota;
        let selection = self.selection_for(&bucket);
        let pending = self.track(&lease);

        for key in keys.iter().take(quota) {
            let reference = ObjectReference::new(&bucket, key).with_owner_opt(owner.clone());
            let set = pending
                .as_ref()
                .and_then(|pending| self.delivery.open_partition_set(pending, &reference));

            let delivered = self.delivery.deliver(&reference, selection, set.as_ref()).await;
            match delivered {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(object = %reference, "Object vanished before delivery, skipping");
                }
                Err(e) => {
                    if let Some(pending) = &pending {
                        pending.abandon();
                    }
                    if let Some(set) = &set {
                        set.complete();
                    }
                    error!(
                        partition = %partition.key,
                        object = %reference,
                        error = %e,
                        "Failed to deliver object of folder, giving up partition"
                    );
                    lease.give_up(Some(Utc::now())).await;
                    return;
                }
            }
            if let Some(set) = &set {
                set.complete();
            }
            state.last_processed_key = Some(key.clone());
        }

        if let Err(e) = lease.save_progress(&state).await {
            if let Some(pending) = &pending {
                pending.abandon();
            }
            warn!(partition = %partition.key, error = %e, "Failed to checkpoint folder, giving up partition");
            lease.give_up(Some(Utc::now())).await;
            return;
        }

        debug!(
            partition = %partition.key,
            delivered = keys.len().min(quota),
            quota_reached,
            "Processed folder partition"
        );

        match pending {
            Some(pending) => {
                lease
                    .prepare_acknowledgment_wait(self.delivery.acknowledgment_timeout())
                    .await;
                pending.release_owner(quota_reached).await;
            }
            None if quota_reached => {
                lease.give_up(Some(Utc::now())).await;
            }
            None => {
                lease.complete(false).await;
            }
        }
    }

    async fn on_empty_folder(
        &self,
        lease: &PartitionLease,
        state: Option<PartitionProgressState>,
        folders: &FolderPartitioning,
    ) {
        self.metrics().folder_partition_no_objects_found.increment();
        let now = Utc::now();

        let Some(state) = state else {
            // First empty observation starts the grace period.
            if let Err(e) = lease.save_progress(&PartitionProgressState::new(now)).await {
                warn!(partition = %lease.key(), error = %e, "Failed to record empty folder");
            }
            lease.give_up(Some(now)).await;
            return;
        };

        let grace = chrono::Duration::from_std(folders.empty_folder_grace).unwrap_or_else(|_| chrono::Duration::days(365));
        if now - state.last_activity() > grace {
            info!(
                partition = %lease.key(),
                grace_secs = folders.empty_folder_grace.as_secs(),
                "No objects found in folder within grace period, deleting partition"
            );
            lease.delete().await;
        } else {
            lease.give_up(Some(now)).await;
        }
    }

    /// Keys under `prefix`, sorted, strictly after `resume_after`.
    async fn list_folder(
        &self,
        bucket: &str,
        prefix: &str,
        owner: Option<&str>,
        resume_after: Option<&str>,
    ) -> Result<Vec<String>> {
        let settings = self.buckets.get(bucket).cloned().unwrap_or_default();
        let objects = list_all_objects(self.store.as_ref(), bucket, Some(prefix), owner);
        futures::pin_mut!(objects);

        let mut keys = Vec::new();
        while let Some(summary) = objects.try_next().await? {
            if summary.is_directory_marker() {
                continue;
            }
            if settings.exclude_suffixes.iter().any(|suffix| summary.key.ends_with(suffix.as_str())) {
                continue;
            }
            if resume_after.is_some_and(|last| summary.key.as_str() <= last) {
                continue;
            }
            keys.push(summary.key);
        }
        keys.sort();
        Ok(keys)
    }

    fn selection_for(&self, bucket: &str) -> DataSelection {
        self.buckets
            .get(bucket)
            .map(|settings| settings.selection)
            .unwrap_or_default()
    }

    /// Start tracking acknowledgements for a claimed partition.
    fn track(&self, lease: &PartitionLease) -> Option<Arc<PartitionAcknowledgements>> {
        if !self.delivery.acknowledgements_enabled() {
            return None;
        }
        let pending = PartitionAcknowledgements::new(lease.clone(), self.delivery.failure_policy());
        self.held.lock().insert(lease.key().clone(), Arc::clone(&pending));
        Some(pending)
    }

    /// Release every partition still waiting for acknowledgements.
    async fn give_up_held(&self) {
        let held: Vec<_> = self
            .held
            .lock()
            .drain()
            .map(|(_, pending)| pending)
            .filter(|pending| !pending.is_settled())
            .collect();
        for pending in held {
            debug!(partition = %pending.lease().key(), "Scan worker stopped, giving up partition");
            pending.abandon();
            pending.lease().give_up(None).await;
        }
    }
}
