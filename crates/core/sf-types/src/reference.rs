//! Object identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of one stored object.
///
/// Equality and hashing consider only the bucket and key; the owning
/// account hint is request metadata, not identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Bucket (container) name
    pub bucket: String,

    /// Object key, already URL-decoded
    pub key: String,

    /// Expected bucket owner account, passed through to store requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_account_hint: Option<String>,
}

impl ObjectReference {
    /// Create a reference without an owner hint.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            owning_account_hint: None,
        }
    }

    /// Attach an owning account hint.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owning_account_hint = Some(owner.into());
        self
    }

    /// Replace the owning account hint.
    pub fn with_owner_opt(mut self, owner: Option<String>) -> Self {
        self.owning_account_hint = owner;
        self
    }

    /// `s3://bucket/key` form, for logs.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl PartialEq for ObjectReference {
    fn eq(&self, other: &Self) -> bool {
        self.bucket == other.bucket && self.key == other.key
    }
}

impl Eq for ObjectReference {}

impl Hash for ObjectReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A deletion to run once delivery of an object is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_bucket_owner: Option<String>,
}

impl From<&ObjectReference> for DeleteObjectRequest {
    fn from(reference: &ObjectReference) -> Self {
        Self {
            bucket: reference.bucket.clone(),
            key: reference.key.clone(),
            expected_bucket_owner: reference.owning_account_hint.clone(),
        }
    }
}

/// Which parts of an object the downstream handler should read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSelection {
    /// Content and object metadata
    #[default]
    DataAndMetadata,

    /// Content only
    DataOnly,

    /// Object metadata only (no GET)
    MetadataOnly,
}

impl DataSelection {
    /// Whether the object body needs to be fetched.
    pub fn includes_data(&self) -> bool {
        !matches!(self, DataSelection::MetadataOnly)
    }

    /// Whether object metadata needs to be fetched.
    pub fn includes_metadata(&self) -> bool {
        !matches!(self, DataSelection::DataOnly)
    }
}

/// Metadata for one listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

impl ObjectSummary {
    /// Zero-byte key ending in `/`, as created by console "create folder".
    pub fn is_directory_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}
