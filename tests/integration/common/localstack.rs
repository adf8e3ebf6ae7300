//! LocalStack test context and utilities.

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sqs::Client as SqsClient;
use std::time::Duration;

/// LocalStack test context providing S3 and SQS clients.
pub struct LocalStackTestContext {
    pub s3: S3Client,
    pub sqs: SqsClient,
    pub endpoint: String,
    pub region: String,
}

impl LocalStackTestContext {
    /// Uses `LOCALSTACK_ENDPOINT` when set, otherwise `http://localhost:4566`.
    pub async fn new() -> Self {
        let endpoint = std::env::var("LOCALSTACK_ENDPOINT").unwrap_or_else(|_| "http://localhost:4566".to_string());
        let region = "us-east-1".to_string();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(aws_sdk_s3::config::Credentials::new("test", "test", None, None, "localstack"))
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build();

        Self {
            s3: S3Client::from_conf(s3_config),
            sqs: SqsClient::new(&config),
            endpoint,
            region,
        }
    }

    /// Check if LocalStack is reachable.
    pub async fn is_available(&self) -> bool {
        self.s3.list_buckets().send().await.is_ok()
    }

    pub async fn create_bucket(&self, name: &str) -> Result<(), aws_sdk_s3::Error> {
        let buckets = self.s3.list_buckets().send().await?;
        let exists = buckets.buckets().iter().any(|b| b.name() == Some(name));
        if !exists {
            self.s3.create_bucket().bucket(name).send().await?;
        }
        Ok(())
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), aws_sdk_s3::Error> {
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.to_vec().into())
            .send()
            .await?;
        Ok(())
    }

    pub async fn object_exists(&self, bucket: &str, key: &str) -> bool {
        self.s3.head_object().bucket(bucket).key(key).send().await.is_ok()
    }

    /// Create an SQS queue, or return the URL of the existing one.
    pub async fn create_queue(&self, name: &str) -> Result<String, aws_sdk_sqs::Error> {
        let queues = self.sqs.list_queues().send().await?;
        if let Some(url) = queues.queue_urls().iter().find(|url| url.ends_with(&format!("/{name}"))) {
            return Ok(url.clone());
        }

        let result = self.sqs.create_queue().queue_name(name).send().await?;
        Ok(result.queue_url.unwrap_or_default())
    }

    pub async fn delete_queue(&self, queue_url: &str) -> Result<(), aws_sdk_sqs::Error> {
        self.sqs.delete_queue().queue_url(queue_url).send().await?;
        Ok(())
    }

    pub async fn purge_queue(&self, queue_url: &str) -> Result<(), aws_sdk_sqs::Error> {
        self.sqs.purge_queue().queue_url(queue_url).send().await?;
        // Wait a moment for purge to take effect
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    pub async fn send_message(&self, queue_url: &str, body: &str) -> Result<(), aws_sdk_sqs::Error> {
        self.sqs.send_message().queue_url(queue_url).message_body(body).send().await?;
        Ok(())
    }

    /// Approximate number of visible messages.
    pub async fn queue_message_count(&self, queue_url: &str) -> Result<i32, aws_sdk_sqs::Error> {
        use aws_sdk_sqs::types::QueueAttributeName;

        let attrs = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await?;

        Ok(attrs
            .attributes()
            .and_then(|a| a.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(0))
    }
}
