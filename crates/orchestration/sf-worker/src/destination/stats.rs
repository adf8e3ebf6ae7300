//! Stats object handler.

use async_trait::async_trait;
use sf_error::Result;
use sf_traits::{AcknowledgementSet, DeliveryHandle, ObjectHandler, ObjectStore};
use sf_types::{DataSelection, ObjectReference};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handler that counts objects and bytes without outputting data.
///
/// Used for throughput measurement.
pub struct StatsObjectHandler {
    store: Arc<dyn ObjectStore>,
    objects: AtomicU64,
    bytes: AtomicU64,
}

impl StatsObjectHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            objects: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Get the current statistics.
    pub fn get_stats(&self) -> StatsReport {
        StatsReport {
            objects: self.objects.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.objects.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

/// Statistics report from the stats handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    /// Objects delivered
    pub objects: u64,
    /// Object bytes read, or reported by metadata when data is not selected
    pub bytes: u64,
}

#[async_trait]
impl ObjectHandler for StatsObjectHandler {
    async fn process_object(
        &self,
        reference: &ObjectReference,
        selection: DataSelection,
        acknowledgements: Option<Arc<dyn AcknowledgementSet>>,
    ) -> Result<()> {
        let handle = acknowledgements.as_ref().map(|set| {
            let handle = DeliveryHandle::next();
            set.add(handle);
            handle
        });

        let size = if selection.includes_data() {
            self.store.get_object(reference).await.map(|data| data.len() as u64)
        } else {
            self.store.head_object(reference).await.map(|metadata| metadata.size)
        };

        if let (Some(set), Some(handle)) = (&acknowledgements, handle) {
            set.release(handle, size.is_ok());
        }

        let size = size?;
        self.objects.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }
}
