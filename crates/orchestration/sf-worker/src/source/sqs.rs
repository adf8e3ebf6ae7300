//! AWS SQS queue client.

use async_trait::async_trait;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use aws_sdk_sqs::Client;
use sf_error::{QueueError, Result, SfError};
use sf_traits::{BatchDeleteOutcome, DeleteEntry, FailedDelete, QueueClient, QueueMessage};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{SqsOptions, MAX_RECEIVE_BATCH};

/// [`QueueClient`] backed by an SQS queue.
pub struct SqsQueueClient {
    client: Client,
    queue_url: String,
    wait_time: Duration,
    visibility_timeout: Duration,
}

impl SqsQueueClient {
    pub fn new(client: Client, options: &SqsOptions) -> Self {
        let options = options.clamped();
        Self {
            client,
            queue_url: options.queue_url,
            wait_time: options.wait_time,
            visibility_timeout: options.visibility_timeout,
        }
    }

    /// Create a client with the default AWS configuration chain.
    pub async fn from_config(options: &SqsOptions) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&aws_config), options)
    }

    /// Create a client with a custom endpoint (for LocalStack).
    pub async fn from_config_with_endpoint(options: &SqsOptions, endpoint_url: &str, region: &str) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .load()
            .await;
        Self::new(Client::new(&aws_config), options)
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive_messages(&self, max: usize) -> Result<Vec<QueueMessage>> {
        let batch_size = max.clamp(1, MAX_RECEIVE_BATCH) as i32;

        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(batch_size)
            .wait_time_seconds(seconds(self.wait_time))
            .visibility_timeout(seconds(self.visibility_timeout))
            .send()
            .await
            .map_err(|e| SfError::Queue(QueueError::Receive(format!("SQS receive failed: {e}"))))?;

        let sqs_messages = response.messages.unwrap_or_default();
        let mut messages = Vec::with_capacity(sqs_messages.len());
        for message in sqs_messages {
            let (Some(message_id), Some(receipt_handle)) = (message.message_id, message.receipt_handle) else {
                warn!("Skipping SQS message without id or receipt handle");
                continue;
            };
            messages.push(QueueMessage::new(
                message_id,
                receipt_handle,
                message.body.unwrap_or_default(),
            ));
        }

        debug!(count = messages.len(), "Received messages from SQS");
        Ok(messages)
    }

    async fn delete_message_batch(&self, entries: &[DeleteEntry]) -> Result<BatchDeleteOutcome> {
        let mut outcome = BatchDeleteOutcome::default();

        // SQS supports batch delete of up to 10 messages
        for chunk in entries.chunks(MAX_RECEIVE_BATCH) {
            let request_entries = chunk
                .iter()
                .map(|entry| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(&entry.id)
                        .receipt_handle(&entry.receipt_handle)
                        .build()
                        .map_err(|e| SfError::Queue(QueueError::Delete(format!("invalid delete entry: {e}"))))
                })
                .collect::<Result<Vec<_>>>()?;

            let result = self
                .client
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(request_entries))
                .send()
                .await
                .map_err(|e| SfError::Queue(QueueError::Delete(format!("SQS batch delete failed: {e}"))))?;

            outcome.merge(BatchDeleteOutcome {
                succeeded: result.successful.into_iter().map(|entry| entry.id).collect(),
                failed: result
                    .failed
                    .into_iter()
                    .map(|entry| FailedDelete {
                        id: entry.id,
                        code: entry.code,
                        message: entry.message,
                    })
                    .collect(),
            });
        }

        Ok(outcome)
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds(timeout))
            .send()
            .await
            .map_err(|e| SfError::Queue(QueueError::ChangeVisibility(format!("SQS change visibility failed: {e}"))))?;
        Ok(())
    }
}
