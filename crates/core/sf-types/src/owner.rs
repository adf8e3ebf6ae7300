//! Expected bucket owner lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expected owner account per bucket, with an optional default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOwners {
    /// Account applied to buckets without their own entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_owner: Option<String>,

    /// Bucket name to owner account
    #[serde(default)]
    pub per_bucket: HashMap<String, String>,
}

impl BucketOwners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_owner(mut self, owner: impl Into<String>) -> Self {
        self.default_owner = Some(owner.into());
        self
    }

    pub fn with_bucket_owner(mut self, bucket: impl Into<String>, owner: impl Into<String>) -> Self {
        self.per_bucket.insert(bucket.into(), owner.into());
        self
    }

    pub fn owner_for(&self, bucket: &str) -> Option<&str> {
        self.per_bucket
            .get(bucket)
            .or(self.default_owner.as_ref())
            .map(String::as_str)
    }
}
