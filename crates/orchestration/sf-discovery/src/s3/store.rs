//! aws-sdk-s3 implementation of [`ObjectStore`].

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use sf_error::{Result, SfError, StoreError};
use sf_traits::{ListObjectsRequest, ObjectMetadata, ObjectPage, ObjectStore};
use sf_types::{DeleteObjectRequest, ObjectReference, ObjectSummary};
use tracing::{debug, trace};

use super::client::{create_s3_client, S3Config};
use super::retry::{with_retry, RetryConfig};

/// Object store backed by S3.
///
/// Listing, head and get calls are retried on transient errors; deletes are
/// not, since the caller applies its own retry policy for them.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    retry: RetryConfig,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Create a store with a client built from `config`.
    pub async fn connect(config: &S3Config) -> Self {
        Self::new(create_s3_client(config).await)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn list_once(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .set_prefix(request.prefix.clone())
            .set_continuation_token(request.continuation_token.clone())
            .set_expected_bucket_owner(request.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|e| StoreError::List(format!("{}: {}", request.bucket, DisplayErrorContext(&e))))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            })
            .collect::<Vec<_>>();

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        trace!(
            bucket = %request.bucket,
            objects = objects.len(),
            truncated = next_continuation_token.is_some(),
            "Listed page"
        );

        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn head_once(&self, reference: &ObjectReference) -> Result<ObjectMetadata> {
        let output = self
            .client
            .head_object()
            .bucket(&reference.bucket)
            .key(&reference.key)
            .set_expected_bucket_owner(reference.owning_account_hint.clone())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    SfError::no_such_key(&reference.bucket, &reference.key)
                } else {
                    StoreError::Head(format!("{reference}: {}", DisplayErrorContext(&e))).into()
                }
            })?;

        Ok(ObjectMetadata {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: output.last_modified().and_then(to_chrono),
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            user_metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn get_once(&self, reference: &ObjectReference) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&reference.bucket)
            .key(&reference.key)
            .set_expected_bucket_owner(reference.owning_account_hint.clone())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    SfError::no_such_key(&reference.bucket, &reference.key)
                } else {
                    StoreError::Get(format!("{reference}: {}", DisplayErrorContext(&e))).into()
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Get(format!("{reference}: failed to read body: {e}")))?;

        Ok(body.into_bytes().to_vec())
    }
}

fn to_chrono(instant: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(instant.secs(), instant.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        with_retry(&self.retry, "list_objects", || self.list_once(request)).await
    }

    async fn head_object(&self, reference: &ObjectReference) -> Result<ObjectMetadata> {
        with_retry(&self.retry, "head_object", || self.head_once(reference)).await
    }

    async fn get_object(&self, reference: &ObjectReference) -> Result<Vec<u8>> {
        with_retry(&self.retry, "get_object", || self.get_once(reference)).await
    }

    async fn delete_object(&self, request: &DeleteObjectRequest) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_expected_bucket_owner(request.expected_bucket_owner.clone())
            .send()
            .await
            .map_err(|e| {
                StoreError::Delete(format!("{}/{}: {}", request.bucket, request.key, DisplayErrorContext(&e)))
            })?;

        debug!(bucket = %request.bucket, key = %request.key, "Deleted object");
        Ok(())
    }
}
