//! S3 and SQS integration tests using LocalStack.

use sf_discovery::{S3Config, S3ObjectStore};
use sf_metrics::SourceMetrics;
use sf_traits::{ObjectStore, QueueClient};
use sf_types::{DataSelection, NotificationSource, ObjectReference};
use sf_worker::{DeliveryCoordinator, NotificationDecoder, QueuePoller, SqsOptions, SqsQueueClient, StatsObjectHandler};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{s3_created, LocalStackTestContext};

fn queue_options(queue_url: &str) -> SqsOptions {
    SqsOptions::new(queue_url)
        .with_wait_time(Duration::from_secs(1))
        .with_visibility_timeout(Duration::from_secs(30))
}

async fn s3_store(ctx: &LocalStackTestContext) -> Arc<S3ObjectStore> {
    let config = S3Config::new()
        .with_endpoint(&ctx.endpoint)
        .with_region(&ctx.region)
        .with_credentials("test", "test");
    Arc::new(S3ObjectStore::connect(&config).await)
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_sqs_client_receive_and_batch_delete() {
    let ctx = LocalStackTestContext::new().await;
    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }

    let queue_url = ctx.create_queue("scanflow-receive").await.unwrap();
    ctx.purge_queue(&queue_url).await.ok();
    for i in 0..3 {
        ctx.send_message(&queue_url, &format!("body-{i}")).await.unwrap();
    }

    let client = SqsQueueClient::from_config_with_endpoint(&queue_options(&queue_url), &ctx.endpoint, &ctx.region).await;

    let mut received = Vec::new();
    for _ in 0..5 {
        received.extend(client.receive_messages(10).await.unwrap());
        if received.len() == 3 {
            break;
        }
    }
    assert_eq!(received.len(), 3);

    client
        .change_visibility(&received[0].receipt_handle, Duration::from_secs(60))
        .await
        .unwrap();

    let entries: Vec<_> = received.iter().map(|m| m.delete_entry()).collect();
    let outcome = client.delete_message_batch(&entries).await.unwrap();
    assert_eq!(outcome.succeeded.len(), 3);
    assert!(outcome.failed.is_empty());

    ctx.delete_queue(&queue_url).await.ok();
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_notification_delivers_object_and_deletes_message() {
    let ctx = LocalStackTestContext::new().await;
    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }

    ctx.create_bucket("scanflow-events").await.unwrap();
    ctx.put_object("scanflow-events", "2024/01/01/event.json", br#"{"id":1}"#)
        .await
        .unwrap();
    let queue_url = ctx.create_queue("scanflow-notifications").await.unwrap();
    ctx.purge_queue(&queue_url).await.ok();
    ctx.send_message(
        &queue_url,
        &s3_created("scanflow-events", "2024/01/01/event.json", "2024-01-01T00:00:00Z"),
    )
    .await
    .unwrap();

    let store = s3_store(&ctx).await;
    let handler = Arc::new(StatsObjectHandler::new(store.clone()));
    let metrics = Arc::new(SourceMetrics::noop());
    let queue = Arc::new(
        SqsQueueClient::from_config_with_endpoint(&queue_options(&queue_url), &ctx.endpoint, &ctx.region).await,
    );
    let poller = QueuePoller::new(
        queue,
        NotificationDecoder::new(NotificationSource::S3),
        Arc::new(DeliveryCoordinator::new(handler.clone(), metrics.clone())),
        queue_options(&queue_url),
    )
    .with_data_selection(DataSelection::DataAndMetadata);

    let mut handled = 0;
    for _ in 0..5 {
        handled += poller.poll_once().await.unwrap();
        if handled > 0 {
            break;
        }
    }

    assert_eq!(handled, 1);
    assert_eq!(handler.get_stats().objects, 1);
    assert_eq!(handler.get_stats().bytes, 8);
    assert_eq!(metrics.sqs_messages_deleted.get(), 1);
    assert_eq!(ctx.queue_message_count(&queue_url).await.unwrap(), 0);

    ctx.delete_queue(&queue_url).await.ok();
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_store_head_get_delete() {
    let ctx = LocalStackTestContext::new().await;
    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }

    ctx.create_bucket("scanflow-store").await.unwrap();
    ctx.put_object("scanflow-store", "a/b.txt", b"hello").await.unwrap();
    let store = s3_store(&ctx).await;
    let reference = ObjectReference::new("scanflow-store", "a/b.txt");

    assert_eq!(store.head_object(&reference).await.unwrap().size, 5);
    assert_eq!(store.get_object(&reference).await.unwrap(), b"hello".to_vec());

    store.delete_object(&(&reference).into()).await.unwrap();
    assert!(!ctx.object_exists("scanflow-store", "a/b.txt").await);

    let missing = store.get_object(&reference).await.unwrap_err();
    assert!(missing.is_not_found());
}
