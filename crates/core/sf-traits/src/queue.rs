//! Notification queue client trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sf_error::Result;
use std::time::Duration;

/// Queue operations used by the poller.
///
/// Implementations include:
/// - AWS SQS (production)
/// - In-memory queue (tests and local runs)
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max` messages (long-polling where supported).
    async fn receive_messages(&self, max: usize) -> Result<Vec<QueueMessage>>;

    /// Delete messages in one batch call.
    ///
    /// A failure of the call itself is an `Err`; per-entry failures are
    /// reported in [`BatchDeleteOutcome::failed`].
    async fn delete_message_batch(&self, entries: &[DeleteEntry]) -> Result<BatchDeleteOutcome>;

    /// Reset a message's visibility timeout.
    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()>;
}

/// A message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Queue-assigned message ID
    pub message_id: String,

    /// Handle used for delete and visibility operations
    pub receipt_handle: String,

    /// Raw notification body
    pub body: String,
}

impl QueueMessage {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
        }
    }

    /// Delete entry for this message.
    pub fn delete_entry(&self) -> DeleteEntry {
        DeleteEntry {
            id: self.message_id.clone(),
            receipt_handle: self.receipt_handle.clone(),
        }
    }
}

/// One entry of a batch delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

/// Per-entry result of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    /// IDs deleted
    pub succeeded: Vec<String>,

    /// Entries the queue refused to delete
    pub failed: Vec<FailedDelete>,
}

impl BatchDeleteOutcome {
    /// Every entry succeeded.
    pub fn all_succeeded(entries: &[DeleteEntry]) -> Self {
        Self {
            succeeded: entries.iter().map(|e| e.id.clone()).collect(),
            failed: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: BatchDeleteOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// An entry the queue failed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
}
