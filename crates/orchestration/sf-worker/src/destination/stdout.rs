//! Stdout object handler.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sf_error::{Result, SfError};
use sf_traits::{AcknowledgementSet, DeliveryHandle, ObjectHandler, ObjectStore};
use sf_types::{DataSelection, ObjectReference};
use std::io::{self, Write};
use std::sync::Arc;
use chrono::{DateTime, Utc};

/// One output line.
#[derive(Debug, Serialize)]
struct ObjectLine<'a> {
    bucket: &'a str,
    key: &'a str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Handler that writes one JSON line per delivered object.
///
/// Used for debugging and pipeline verification.
pub struct StdoutObjectHandler {
    store: Arc<dyn ObjectStore>,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutObjectHandler {
    /// Write to stdout.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_writer(store, Box::new(io::stdout()))
    }

    /// Write to any sink.
    pub fn with_writer(store: Arc<dyn ObjectStore>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            store,
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl ObjectHandler for StdoutObjectHandler {
    async fn process_object(
        &self,
        reference: &ObjectReference,
        selection: DataSelection,
        acknowledgements: Option<Arc<dyn AcknowledgementSet>>,
    ) -> Result<()> {
        let metadata = if selection.includes_metadata() {
            Some(self.store.head_object(reference).await?)
        } else {
            None
        };
        let data = if selection.includes_data() {
            Some(self.store.get_object(reference).await?)
        } else {
            None
        };

        let size = match (&metadata, &data) {
            (Some(metadata), _) => metadata.size,
            (None, Some(data)) => data.len() as u64,
            (None, None) => 0,
        };
        let (last_modified, content_type) = metadata
            .map(|metadata| (metadata.last_modified, metadata.content_type))
            .unwrap_or_default();

        let line = ObjectLine {
            bucket: &reference.bucket,
            key: &reference.key,
            size,
            last_modified,
            content_type,
            content: data.map(|data| String::from_utf8_lossy(&data).into_owned()),
        };
        let line = serde_json::to_string(&line)
            .map_err(|e| SfError::Delivery(format!("Failed to serialize JSON: {e}")))?;

        let handle = acknowledgements.as_ref().map(|set| {
            let handle = DeliveryHandle::next();
            set.add(handle);
            handle
        });

        let written = {
            let mut writer = self.writer.lock();
            writeln!(writer, "{line}").and_then(|()| writer.flush())
        };

        if let (Some(set), Some(handle)) = (&acknowledgements, handle) {
            set.release(handle, written.is_ok());
        }
        written.map_err(|e| SfError::Delivery(format!("Failed to write to stdout: {e}")))
    }
}
