//! Object store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sf_error::Result;
use sf_types::{DeleteObjectRequest, ObjectReference, ObjectSummary};
use std::collections::HashMap;

/// Object store operations used by discovery and delivery.
///
/// Lower-layer network retries are the implementation's concern. A missing
/// object is reported as [`StoreError::NoSuchKey`](sf_error::StoreError::NoSuchKey).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects.
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage>;

    /// Fetch object metadata.
    async fn head_object(&self, reference: &ObjectReference) -> Result<ObjectMetadata>;

    /// Fetch object content.
    async fn get_object(&self, reference: &ObjectReference) -> Result<Vec<u8>>;

    /// Delete one object.
    async fn delete_object(&self, request: &DeleteObjectRequest) -> Result<()>;
}

/// Parameters of one listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub expected_bucket_owner: Option<String>,
}

impl ListObjectsRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn with_expected_bucket_owner(mut self, owner: Option<String>) -> Self {
        self.expected_bucket_owner = owner;
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,

    /// Token for the next page; `None` on the last page
    pub next_continuation_token: Option<String>,
}

impl ObjectPage {
    pub fn is_truncated(&self) -> bool {
        self.next_continuation_token.is_some()
    }
}

/// Object metadata returned by a head call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub user_metadata: HashMap<String, String>,
}
