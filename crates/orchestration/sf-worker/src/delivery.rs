//! Delivery coordination.
//!
//! [`DeliveryCoordinator`] is the one place that hands objects to the
//! downstream [`ObjectHandler`] and wires acknowledgement sets to the lease
//! coordinator. It never waits for acknowledgements: it registers a
//! completion callback and a lease-renewing progress check, and returns.

use futures::FutureExt;
use sf_error::Result;
use sf_metrics::SourceMetrics;
use sf_traits::{
    AcknowledgementSet, AcknowledgementSetManager, CompletionCallback, ObjectHandler, ObjectStore,
    ProgressCheck, ProgressCheckCallback,
};
use sf_types::{DataSelection, DeleteObjectRequest, ObjectReference};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::{AcknowledgmentFailurePolicy, SourceConfig};
use crate::lease::PartitionLease;

/// Deletes objects whose delivery was acknowledged.
#[derive(Clone)]
pub struct ObjectDeleter {
    store: Arc<dyn ObjectStore>,
    attempts: u32,
    retry_delay: Duration,
    metrics: Arc<SourceMetrics>,
}

impl ObjectDeleter {
    /// Three attempts, one second apart.
    pub fn new(store: Arc<dyn ObjectStore>, metrics: Arc<SourceMetrics>) -> Self {
        Self {
            store,
            attempts: 3,
            retry_delay: Duration::from_secs(1),
            metrics,
        }
    }

    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Delete one object. Returns whether it was deleted.
    pub async fn delete(&self, request: &DeleteObjectRequest) -> bool {
        for attempt in 1..=self.attempts {
            match self.store.delete_object(request).await {
                Ok(()) => {
                    self.metrics.objects_deleted.increment();
                    debug!(bucket = %request.bucket, key = %request.key, "Deleted delivered object");
                    return true;
                }
                Err(e) if attempt < self.attempts => {
                    debug!(
                        bucket = %request.bucket,
                        key = %request.key,
                        attempt,
                        error = %e,
                        "Object delete failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        bucket = %request.bucket,
                        key = %request.key,
                        attempts = self.attempts,
                        error = %e,
                        "Giving up deleting object"
                    );
                }
            }
        }
        self.metrics.objects_delete_failed.increment();
        false
    }
}

/// Outstanding acknowledgement sets of one partition.
///
/// Starts with one reference held by the loop that claimed the partition;
/// every set opened for it adds one. Whoever drops the last reference
/// finishes the lease: the loop when nothing is pending, otherwise the last
/// completion callback.
pub struct PartitionAcknowledgements {
    lease: PartitionLease,
    policy: AcknowledgmentFailurePolicy,
    outstanding: AtomicUsize,
    failed: AtomicBool,
    abandoned: AtomicBool,
    resume_later: AtomicBool,
}

impl PartitionAcknowledgements {
    pub fn new(lease: PartitionLease, policy: AcknowledgmentFailurePolicy) -> Arc<Self> {
        Arc::new(Self {
            lease,
            policy,
            outstanding: AtomicUsize::new(1),
            failed: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            resume_later: AtomicBool::new(false),
        })
    }

    pub fn lease(&self) -> &PartitionLease {
        &self.lease
    }

    /// The loop gave the partition up itself; pending callbacks must not
    /// delete objects or finish the lease.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Nothing left for this worker to do with the partition.
    pub fn is_settled(&self) -> bool {
        self.is_abandoned() || self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Release the loop's reference. With `resume_later` the partition is
    /// given up once settled so a later lease continues it.
    pub async fn release_owner(&self, resume_later: bool) {
        self.resume_later.store(resume_later, Ordering::SeqCst);
        self.release().await;
    }

    fn open(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    async fn settle(&self, success: bool) {
        if !success {
            self.failed.store(true, Ordering::SeqCst);
        }
        self.release().await;
    }

    async fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        if self.is_abandoned() {
            trace!(partition = %self.lease.key(), "Abandoned partition settled");
            return;
        }

        let failed = self.failed.load(Ordering::SeqCst);
        if failed {
            debug!(partition = %self.lease.key(), policy = ?self.policy, "Acknowledgement failed or timed out");
        }

        if self.resume_later.load(Ordering::SeqCst) {
            self.lease.give_up(Some(chrono::Utc::now())).await;
        } else if failed && self.policy == AcknowledgmentFailurePolicy::GiveUp {
            self.lease.give_up(None).await;
        } else {
            self.lease.complete(true).await;
        }
    }
}

/// Hands objects downstream and manages their acknowledgement lifecycle.
pub struct DeliveryCoordinator {
    handler: Arc<dyn ObjectHandler>,
    acknowledgements: Option<Arc<dyn AcknowledgementSetManager>>,
    deleter: Option<ObjectDeleter>,
    metrics: Arc<SourceMetrics>,
    acknowledgment_timeout: Duration,
    lease_renewal_interval: Duration,
    failure_policy: AcknowledgmentFailurePolicy,
}

impl DeliveryCoordinator {
    /// Deliver synchronously, without acknowledgements.
    pub fn new(handler: Arc<dyn ObjectHandler>, metrics: Arc<SourceMetrics>) -> Self {
        let defaults = SourceConfig::default();
        Self {
            handler,
            acknowledgements: None,
            deleter: None,
            metrics,
            acknowledgment_timeout: defaults.acknowledgment_timeout,
            lease_renewal_interval: defaults.lease_renewal_interval,
            failure_policy: defaults.acknowledgment_failure_policy,
        }
    }

    /// Enable end-to-end acknowledgements.
    pub fn with_acknowledgements(mut self, manager: Arc<dyn AcknowledgementSetManager>) -> Self {
        self.acknowledgements = Some(manager);
        self
    }

    /// Delete objects once their delivery is acknowledged.
    pub fn with_deleter(mut self, deleter: ObjectDeleter) -> Self {
        self.deleter = Some(deleter);
        self
    }

    pub fn with_acknowledgment_timeout(mut self, timeout: Duration) -> Self {
        self.acknowledgment_timeout = timeout;
        self
    }

    pub fn with_lease_renewal_interval(mut self, interval: Duration) -> Self {
        self.lease_renewal_interval = interval;
        self
    }

    pub fn with_failure_policy(mut self, policy: AcknowledgmentFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn acknowledgements_enabled(&self) -> bool {
        self.acknowledgements.is_some()
    }

    pub fn acknowledgment_timeout(&self) -> Duration {
        self.acknowledgment_timeout
    }

    pub fn failure_policy(&self) -> AcknowledgmentFailurePolicy {
        self.failure_policy
    }

    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// Hand one object to the handler. Handler errors are returned unchanged.
    pub async fn deliver(
        &self,
        reference: &ObjectReference,
        selection: DataSelection,
        acknowledgements: Option<&Arc<dyn AcknowledgementSet>>,
    ) -> Result<()> {
        match self
            .handler
            .process_object(reference, selection, acknowledgements.cloned())
            .await
        {
            Ok(()) => {
                self.metrics.objects_delivered.increment();
                trace!(object = %reference, "Delivered object");
                Ok(())
            }
            Err(e) => {
                if e.is_not_found() {
                    self.metrics.objects_not_found.increment();
                } else {
                    self.metrics.objects_delivery_failed.increment();
                }
                Err(e)
            }
        }
    }

    /// Create a set with an arbitrary completion callback, or `None` when
    /// acknowledgements are disabled.
    pub fn create_set(&self, on_completion: CompletionCallback, timeout: Duration) -> Option<Arc<dyn AcknowledgementSet>> {
        self.acknowledgements
            .as_ref()
            .map(|manager| manager.create(on_completion, timeout))
    }

    /// Open an acknowledgement set for objects of a leased partition.
    ///
    /// On positive acknowledgement `reference` is deleted when delete on
    /// read is configured. The lease is renewed on every progress check
    /// while the set is pending. Returns `None` when acknowledgements are
    /// disabled.
    pub fn open_partition_set(
        &self,
        partition: &Arc<PartitionAcknowledgements>,
        reference: &ObjectReference,
    ) -> Option<Arc<dyn AcknowledgementSet>> {
        let manager = self.acknowledgements.as_ref()?;

        let delete_request = self.deleter.as_ref().map(|_| DeleteObjectRequest::from(reference));
        let deleter = self.deleter.clone();
        let metrics = Arc::clone(&self.metrics);
        let owner = Arc::clone(partition);
        let on_completion: CompletionCallback = Box::new(move |success: bool| {
            async move {
                metrics.acknowledgement_set_callbacks.increment();
                if owner.is_abandoned() {
                    owner.settle(success).await;
                    return;
                }
                if success {
                    if let (Some(deleter), Some(request)) = (&deleter, &delete_request) {
                        deleter.delete(request).await;
                    }
                }
                owner.settle(success).await;
            }
            .boxed()
        });

        partition.open();
        let set = manager.create(on_completion, self.acknowledgment_timeout);

        let lease = partition.lease().clone();
        let renew: ProgressCheckCallback = Arc::new(move |_progress: ProgressCheck| {
            let lease = lease.clone();
            async move { lease.renew_from_progress_check().await }.boxed()
        });
        set.add_progress_check(renew, self.lease_renewal_interval);

        Some(set)
    }
}
