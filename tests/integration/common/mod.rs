//! Shared fixtures for integration tests.

pub mod localstack;

pub use localstack::LocalStackTestContext;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use sf_error::{Result, SfError};
use sf_traits::{AcknowledgementSet, DeliveryHandle, ObjectHandler};
use sf_types::{DataSelection, ObjectReference};
use std::sync::Arc;

/// Records every delivered reference.
///
/// Keys starting with `fail` are rejected with a delivery error. With
/// `hold_acknowledgements` handles stay pending until released by the test.
#[derive(Default)]
pub struct RecordingHandler {
    pub seen: Mutex<Vec<ObjectReference>>,
    pub hold_acknowledgements: bool,
    held: Mutex<Vec<(Arc<dyn AcknowledgementSet>, DeliveryHandle)>>,
}

impl RecordingHandler {
    pub fn holding() -> Self {
        Self {
            hold_acknowledgements: true,
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.seen.lock().iter().map(|r| r.key.clone()).collect()
    }

    pub fn release_all(&self, success: bool) {
        for (set, handle) in self.held.lock().drain(..) {
            set.release(handle, success);
        }
    }
}

#[async_trait]
impl ObjectHandler for RecordingHandler {
    async fn process_object(
        &self,
        reference: &ObjectReference,
        _selection: DataSelection,
        acknowledgements: Option<Arc<dyn AcknowledgementSet>>,
    ) -> Result<()> {
        self.seen.lock().push(reference.clone());
        if reference.key.starts_with("fail") {
            return Err(SfError::Delivery(format!("rejected {reference}")));
        }
        if let Some(set) = acknowledgements {
            let handle = DeliveryHandle::next();
            set.add(handle);
            if self.hold_acknowledgements {
                self.held.lock().push((set, handle));
            } else {
                set.release(handle, true);
            }
        }
        Ok(())
    }
}

/// Native S3 `ObjectCreated:Put` notification for one object.
pub fn s3_created(bucket: &str, key: &str, time: &str) -> String {
    json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "eventTime": time,
            "s3": {
                "bucket": {"name": bucket},
                "object": {"key": key, "size": 128}
            }
        }]
    })
    .to_string()
}

/// EventBridge `Object Created` event for one object.
pub fn event_bridge_created(bucket: &str, key: &str, time: &str) -> String {
    json!({
        "version": "0",
        "detail-type": "Object Created",
        "source": "aws.s3",
        "time": time,
        "detail": {
            "bucket": {"name": bucket},
            "object": {"key": key, "size": 128}
        }
    })
    .to_string()
}

pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
