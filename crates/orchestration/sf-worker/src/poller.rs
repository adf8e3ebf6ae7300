//! Queue poller.
//!
//! One polling cycle receives a batch of notifications, decodes each into
//! object references, hands the references to the [`DeliveryCoordinator`]
//! and deletes handled messages in one batch call. With acknowledgements
//! enabled a message is deleted by its acknowledgement set's completion
//! callback instead, after the downstream confirmed every object.

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use sf_discovery::ExponentialBackoff;
use sf_error::{Result, SfError};
use sf_metrics::SourceMetrics;
use sf_traits::{
    AcknowledgementSet, Backoff, CompletionCallback, DeleteEntry, ProgressCheck, ProgressCheckCallback, QueueClient,
    QueueMessage,
};
use sf_types::{DataSelection, OnErrorOption};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SqsOptions;
use crate::delivery::DeliveryCoordinator;
use crate::gate::ProcessingGate;
use crate::notification::{NotificationDecoder, ObjectNotification};

/// Polls one queue until stopped.
pub struct QueuePoller {
    queue: Arc<dyn QueueClient>,
    decoder: NotificationDecoder,
    delivery: Arc<DeliveryCoordinator>,
    options: SqsOptions,
    on_error: OnErrorOption,
    selection: DataSelection,
    backoff: Arc<dyn Backoff>,
    gate: ProcessingGate,

    /// Consecutive failed queue calls
    failed_attempts: AtomicU32,
    stopped: Arc<AtomicBool>,
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        decoder: NotificationDecoder,
        delivery: Arc<DeliveryCoordinator>,
        options: SqsOptions,
    ) -> Self {
        Self {
            queue,
            decoder,
            delivery,
            options: options.clamped(),
            on_error: OnErrorOption::default(),
            selection: DataSelection::default(),
            backoff: Arc::new(ExponentialBackoff::for_queue_polling()),
            gate: ProcessingGate::new(),
            failed_attempts: AtomicU32::new(0),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// What to do with messages that cannot be decoded.
    pub fn with_on_error(mut self, on_error: OnErrorOption) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_data_selection(mut self, selection: DataSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Backoff applied after failed queue calls.
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_gate(mut self, gate: ProcessingGate) -> Self {
        self.gate = gate;
        self
    }

    fn metrics(&self) -> &Arc<SourceMetrics> {
        self.delivery.metrics()
    }

    /// Stop polling. Pending visibility extensions stop as well.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Poll until stopped. Returns an error only when the backoff policy is
    /// exhausted.
    pub async fn run(&self) -> Result<()> {
        info!(queue_url = %self.options.queue_url, "Queue poller started");

        while !self.is_stopped() {
            if !self.gate.is_open() {
                debug!("Processing paused, not polling");
                tokio::time::sleep(self.gate.closed_wait()).await;
                continue;
            }

            let processed = match self.poll_once().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!(
                        queue_url = %self.options.queue_url,
                        error = %e,
                        "Queue poller stopping; check the queue exists and is accessible"
                    );
                    return Err(e);
                }
            };

            if processed > 0 && !self.options.poll_delay.is_zero() {
                tokio::time::sleep(self.options.poll_delay).await;
            }
        }

        info!("Queue poller stopped");
        Ok(())
    }

    /// Run one polling cycle. Returns the number of messages received.
    pub async fn poll_once(&self) -> Result<usize> {
        let messages = match self.queue.receive_messages(self.options.maximum_messages).await {
            Ok(messages) => {
                self.failed_attempts.store(0, Ordering::Relaxed);
                messages
            }
            Err(e) => {
                error!(error = %e, "Failed to receive from queue, backing off");
                self.apply_backoff().await?;
                return Ok(0);
            }
        };
        if messages.is_empty() {
            return Ok(0);
        }

        self.metrics().sqs_messages_received.add(messages.len() as u64);
        debug!(count = messages.len(), "Received notifications");

        let mut to_delete = Vec::with_capacity(messages.len());
        for message in &messages {
            if let Some(entry) = self.process_message(message).await {
                to_delete.push(entry);
            }
        }

        if !to_delete.is_empty() {
            if let Err(e) = delete_messages(self.queue.as_ref(), self.metrics(), &to_delete).await {
                error!(error = %e, count = to_delete.len(), "Failed to delete messages, backing off");
                self.apply_backoff().await?;
            }
        }
        Ok(messages.len())
    }

    /// Decode and dispatch one message. Returns its delete entry when the
    /// message can be deleted right away.
    async fn process_message(&self, message: &QueueMessage) -> Option<DeleteEntry> {
        let notifications = match self.decoder.decode(&message.body) {
            Ok(notifications) => notifications,
            Err(e) => {
                self.metrics().sqs_messages_failed.increment();
                return match self.on_error {
                    OnErrorOption::DeleteMessages => {
                        warn!(message_id = %message.message_id, error = %e, "Deleting unparsable notification");
                        Some(message.delete_entry())
                    }
                    OnErrorOption::RetainMessages => {
                        warn!(
                            message_id = %message.message_id,
                            error = %e,
                            "Unparsable notification left for redelivery"
                        );
                        None
                    }
                };
            }
        };

        if notifications.is_empty() {
            self.metrics().empty_notifications.increment();
            debug!(message_id = %message.message_id, "Notification announced no new objects");
            return Some(message.delete_entry());
        }

        let abandoned = Arc::new(AtomicBool::new(false));
        match self.open_message_set(message, &abandoned) {
            Some(set) => {
                if !self.dispatch(message, &notifications, Some(&set)).await {
                    abandoned.store(true, Ordering::SeqCst);
                }
                set.complete();
                None
            }
            None => self
                .dispatch(message, &notifications, None)
                .await
                .then(|| message.delete_entry()),
        }
    }

    /// Deliver every announced object. Returns whether the message is handled;
    /// stops at the first delivery error.
    async fn dispatch(
        &self,
        message: &QueueMessage,
        notifications: &[ObjectNotification],
        set: Option<&Arc<dyn AcknowledgementSet>>,
    ) -> bool {
        for notification in notifications {
            match self.delivery.deliver(&notification.reference, self.selection, set).await {
                Ok(()) => {
                    let delay = (Utc::now() - notification.event_time).to_std().unwrap_or_default();
                    self.metrics().sqs_message_delay.record(delay);
                }
                Err(e) if e.is_not_found() => {
                    warn!(
                        object = %notification.reference,
                        "Announced object no longer exists, treating it as delivered"
                    );
                }
                Err(e) => {
                    error!(
                        message_id = %message.message_id,
                        object = %notification.reference,
                        error = %e,
                        "Failed to deliver object, message left for redelivery"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Acknowledgement set that deletes `message` on success and, with
    /// duplicate protection, keeps the message invisible while pending.
    fn open_message_set(&self, message: &QueueMessage, abandoned: &Arc<AtomicBool>) -> Option<Arc<dyn AcknowledgementSet>> {
        if !self.delivery.acknowledgements_enabled() {
            return None;
        }

        let queue = Arc::clone(&self.queue);
        let metrics = Arc::clone(self.metrics());
        let entry = message.delete_entry();
        let abandoned = Arc::clone(abandoned);
        let on_completion: CompletionCallback = Box::new(move |success: bool| {
            async move {
                metrics.acknowledgement_set_callbacks.increment();
                if !success {
                    debug!(message_id = %entry.id, "Negative acknowledgement, message left for redelivery");
                    return;
                }
                if abandoned.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = delete_messages(queue.as_ref(), &metrics, std::slice::from_ref(&entry)).await {
                    error!(message_id = %entry.id, error = %e, "Failed to delete acknowledged message");
                }
            }
            .boxed()
        });

        let set = self
            .delivery
            .create_set(on_completion, self.options.acknowledgment_timeout())?;

        if self.options.visibility_duplication_protection {
            let interval = self.options.progress_interval();
            set.add_progress_check(self.visibility_extension(message, interval), interval);
        }
        Some(set)
    }

    /// Progress check resetting the message's visibility timeout, until the
    /// total granted visibility reaches the protection timeout.
    fn visibility_extension(&self, message: &QueueMessage, interval: Duration) -> ProgressCheckCallback {
        let queue = Arc::clone(&self.queue);
        let metrics = Arc::clone(self.metrics());
        let stopped = Arc::clone(&self.stopped);
        let message_id = message.message_id.clone();
        let receipt_handle = message.receipt_handle.clone();
        let visibility_timeout = self.options.visibility_timeout;
        let limit = self.options.visibility_duplicate_protection_timeout;
        let granted = Arc::new(Mutex::new(visibility_timeout));

        Arc::new(move |_progress: ProgressCheck| {
            let queue = Arc::clone(&queue);
            let metrics = Arc::clone(&metrics);
            let stopped = Arc::clone(&stopped);
            let granted = Arc::clone(&granted);
            let message_id = message_id.clone();
            let receipt_handle = receipt_handle.clone();
            async move {
                if stopped.load(Ordering::Relaxed) {
                    return;
                }
                {
                    let mut granted = granted.lock();
                    let next = *granted + interval;
                    if next >= limit {
                        return;
                    }
                    *granted = next;
                }
                match queue.change_visibility(&receipt_handle, visibility_timeout).await {
                    Ok(()) => {
                        metrics.sqs_visibility_timeout_changed.increment();
                        info!(
                            message_id = %message_id,
                            visibility_secs = visibility_timeout.as_secs(),
                            "Extended message visibility"
                        );
                    }
                    Err(e) => {
                        metrics.sqs_visibility_timeout_change_failed.increment();
                        error!(message_id = %message_id, error = %e, "Failed to extend message visibility");
                    }
                }
            }
            .boxed()
        })
    }

    async fn apply_backoff(&self) -> Result<()> {
        let attempt = self.failed_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        match self.backoff.next_delay(attempt) {
            Some(delay) => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "Pausing queue processing after an error");
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Err(SfError::RetriesExhausted(format!(
                "queue retries exhausted after {attempt} attempts; make sure the queue exists and is accessible"
            ))),
        }
    }
}

/// Batch delete, counting deleted and failed entries.
async fn delete_messages(queue: &dyn QueueClient, metrics: &SourceMetrics, entries: &[DeleteEntry]) -> Result<()> {
    match queue.delete_message_batch(entries).await {
        Ok(outcome) => {
            metrics.sqs_messages_deleted.add(outcome.succeeded.len() as u64);
            if !outcome.failed.is_empty() {
                metrics.sqs_messages_delete_failed.add(outcome.failed.len() as u64);
                for failed in &outcome.failed {
                    warn!(
                        message_id = %failed.id,
                        code = %failed.code,
                        reason = failed.message.as_deref().unwrap_or(""),
                        "Failed to delete message, it will be redelivered"
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            metrics.sqs_messages_delete_failed.add(entries.len() as u64);
            Err(e)
        }
    }
}
