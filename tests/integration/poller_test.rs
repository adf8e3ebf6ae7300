//! Queue polling scenarios against the in-memory queue.

use sf_error::SfError;
use sf_memory::{InMemoryAcknowledgementSetManager, InMemoryQueue};
use sf_metrics::SourceMetrics;
use sf_traits::Backoff;
use sf_types::NotificationSource;
use sf_worker::{DeliveryCoordinator, NotificationDecoder, ProcessingGate, QueuePoller, SqsOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{event_bridge_created, s3_created, settle, RecordingHandler};

/// Counts calls; exhausted once `attempt` reaches `max_attempts`.
struct CountingBackoff {
    calls: AtomicUsize,
    max_attempts: u32,
}

impl CountingBackoff {
    fn new(max_attempts: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            max_attempts,
        })
    }
}

impl Backoff for CountingBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (attempt < self.max_attempts).then_some(Duration::from_millis(1))
    }
}

struct Pipeline {
    queue: Arc<InMemoryQueue>,
    handler: Arc<RecordingHandler>,
    metrics: Arc<SourceMetrics>,
}

impl Pipeline {
    fn new(handler: RecordingHandler) -> Self {
        Self {
            queue: Arc::new(InMemoryQueue::new()),
            handler: Arc::new(handler),
            metrics: Arc::new(SourceMetrics::noop()),
        }
    }

    fn poller(&self, source: NotificationSource, acknowledgements: bool, options: SqsOptions) -> QueuePoller {
        let mut delivery = DeliveryCoordinator::new(self.handler.clone(), self.metrics.clone());
        if acknowledgements {
            delivery = delivery.with_acknowledgements(Arc::new(InMemoryAcknowledgementSetManager::new()));
        }
        QueuePoller::new(
            self.queue.clone(),
            NotificationDecoder::new(source),
            Arc::new(delivery),
            options,
        )
        .with_gate(ProcessingGate::new().without_env())
    }
}

#[tokio::test]
async fn test_partial_batch_delete_failure() {
    let p = Pipeline::new(RecordingHandler::default());
    let ids: Vec<String> = (0..6)
        .map(|i| p.queue.send(s3_created("orders", &format!("part-{i}.json"), "2024-01-01T00:00:00Z")))
        .collect();
    for id in ids.iter().skip(3) {
        p.queue.fail_delete_of(id.clone());
    }

    let poller = p.poller(NotificationSource::S3, false, SqsOptions::new("orders-queue"));
    assert_eq!(poller.poll_once().await.unwrap(), 6);

    assert_eq!(p.metrics.sqs_messages_received.get(), 6);
    assert_eq!(p.metrics.sqs_messages_deleted.get(), 3);
    assert_eq!(p.metrics.sqs_messages_delete_failed.get(), 3);
    assert_eq!(p.queue.deleted_ids(), ids[..3].to_vec());

    // Every reference was dispatched regardless of the delete outcome.
    let mut keys = p.handler.keys();
    keys.sort();
    assert_eq!(keys, (0..6).map(|i| format!("part-{i}.json")).collect::<Vec<_>>());

    // Failed deletes are redelivered.
    p.queue.requeue_in_flight();
    assert_eq!(p.queue.visible_len(), 3);
}

#[tokio::test]
async fn test_delivery_error_leaves_message_for_redelivery() {
    let p = Pipeline::new(RecordingHandler::default());
    let ok = p.queue.send(event_bridge_created("orders", "good.json", "2024-01-01T00:00:00Z"));
    p.queue.send(event_bridge_created("orders", "fail.json", "2024-01-01T00:00:00Z"));

    let poller = p.poller(NotificationSource::EventBridge, false, SqsOptions::new("orders-queue"));
    poller.poll_once().await.unwrap();

    assert_eq!(p.queue.deleted_ids(), vec![ok]);
    assert_eq!(p.queue.in_flight_len(), 1);
    assert_eq!(p.metrics.objects_delivery_failed.get(), 1);
}

#[tokio::test]
async fn test_failing_queue_exhausts_backoff() {
    let p = Pipeline::new(RecordingHandler::default());
    p.queue.fail_all_receives();
    let backoff = CountingBackoff::new(4);

    let poller = p
        .poller(NotificationSource::S3, false, SqsOptions::new("orders-queue"))
        .with_backoff(backoff.clone());
    let err = poller.run().await.unwrap_err();

    assert!(matches!(err, SfError::RetriesExhausted(_)));
    assert_eq!(backoff.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_one_failure_backs_off_once() {
    let p = Pipeline::new(RecordingHandler::default());
    p.queue.fail_next_receives(1);
    p.queue.send(s3_created("orders", "a.json", "2024-01-01T00:00:00Z"));
    let backoff = CountingBackoff::new(4);

    let poller = p
        .poller(NotificationSource::S3, false, SqsOptions::new("orders-queue"))
        .with_backoff(backoff.clone());
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    assert_eq!(poller.poll_once().await.unwrap(), 1);
    assert_eq!(poller.poll_once().await.unwrap(), 0);

    assert_eq!(backoff.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_visibility_protection_stops_with_poller() {
    let p = Pipeline::new(RecordingHandler::holding());
    let id = p.queue.send(s3_created("orders", "slow.json", "2024-01-01T00:00:00Z"));
    let options = SqsOptions::new("orders-queue")
        .with_visibility_timeout(Duration::from_secs(30))
        .with_visibility_duplicate_protection(Duration::from_secs(2 * 60 * 60));
    let interval = options.progress_interval();
    let poller = p.poller(NotificationSource::S3, true, options);

    poller.poll_once().await.unwrap();
    tokio::time::sleep(interval + Duration::from_secs(1)).await;

    assert_eq!(
        p.queue.visibility_changes(),
        vec![("receipt-0".to_string(), Duration::from_secs(30))]
    );

    poller.stop();
    tokio::time::sleep(interval * 5).await;
    assert_eq!(p.queue.visibility_changes().len(), 1);

    // The message is still deleted once delivery is acknowledged.
    p.handler.release_all(true);
    settle().await;
    assert_eq!(p.queue.deleted_ids(), vec![id]);
}

#[tokio::test]
async fn test_concurrent_pollers_share_queue() {
    let p = Pipeline::new(RecordingHandler::default());
    for i in 0..40 {
        p.queue.send(s3_created("orders", &format!("obj-{i:02}.json"), "2024-01-01T00:00:00Z"));
    }

    let pollers: Vec<Arc<QueuePoller>> = (0..4)
        .map(|_| Arc::new(p.poller(NotificationSource::S3, false, SqsOptions::new("orders-queue"))))
        .collect();
    let tasks = pollers.iter().cloned().map(|poller| {
        tokio::spawn(async move {
            let mut handled = 0;
            loop {
                let received = poller.poll_once().await.unwrap();
                if received == 0 {
                    return handled;
                }
                handled += received;
            }
        })
    });
    let handled: usize = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .sum();

    assert_eq!(handled, 40);
    assert_eq!(p.queue.deleted_ids().len(), 40);
    let mut keys = p.handler.keys();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 40);
}
