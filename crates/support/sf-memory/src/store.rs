//! In-process object store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sf_error::{Result, SfError, StoreError};
use sf_traits::{ListObjectsRequest, ObjectMetadata, ObjectPage, ObjectStore};
use sf_types::{DeleteObjectRequest, ObjectReference, ObjectSummary};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Sorted, paginated object store keyed by bucket then key.
///
/// Listing returns keys in lexicographic order and uses the last returned
/// key as the continuation token. Deletes can be made to fail a number of
/// times to exercise retry paths.
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    owners: RwLock<HashMap<String, String>>,
    page_size: usize,
    failing_deletes: AtomicU32,
    list_calls: AtomicUsize,
    deletes: Mutex<Vec<DeleteObjectRequest>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            owners: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            failing_deletes: AtomicU32::new(0),
            list_calls: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Objects returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Reject requests whose expected bucket owner differs from `owner`.
    pub fn with_bucket_owner(self, bucket: impl Into<String>, owner: impl Into<String>) -> Self {
        self.owners.write().insert(bucket.into(), owner.into());
        self
    }

    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        self.buckets.write().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    pub fn remove_object(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.buckets.write().get_mut(bucket) {
            objects.remove(key);
        }
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key))
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, BTreeMap::len)
    }

    /// Make the next `count` deletes fail with a transient error.
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Every delete request received, failed attempts included.
    pub fn delete_requests(&self) -> Vec<DeleteObjectRequest> {
        self.deletes.lock().clone()
    }

    fn check_owner(&self, bucket: &str, expected: Option<&str>) -> Result<()> {
        let owners = self.owners.read();
        match (owners.get(bucket), expected) {
            (Some(actual), Some(expected)) if actual != expected => Err(StoreError::AccessDenied(format!(
                "bucket {bucket} is not owned by {expected}"
            ))
            .into()),
            _ => Ok(()),
        }
    }

    fn lookup(&self, reference: &ObjectReference) -> Result<StoredObject> {
        self.check_owner(&reference.bucket, reference.owning_account_hint.as_deref())?;
        self.buckets
            .read()
            .get(&reference.bucket)
            .and_then(|objects| objects.get(&reference.key))
            .cloned()
            .ok_or_else(|| SfError::no_such_key(&reference.bucket, &reference.key))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ObjectPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_owner(&request.bucket, request.expected_bucket_owner.as_deref())?;

        let buckets = self.buckets.read();
        let objects = buckets
            .get(&request.bucket)
            .ok_or_else(|| StoreError::List(format!("NoSuchBucket: {}", request.bucket)))?;

        let lower = match &request.continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };
        let prefix = request.prefix.as_deref().unwrap_or("");

        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix));

        let mut page = Vec::with_capacity(self.page_size.min(objects.len()));
        for (key, object) in matching.by_ref().take(self.page_size) {
            page.push(ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            });
        }

        let next_continuation_token = if matching.next().is_some() {
            page.last().map(|summary| summary.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_continuation_token,
        })
    }

    async fn head_object(&self, reference: &ObjectReference) -> Result<ObjectMetadata> {
        let object = self.lookup(reference)?;
        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            last_modified: Some(object.last_modified),
            ..Default::default()
        })
    }

    async fn get_object(&self, reference: &ObjectReference) -> Result<Vec<u8>> {
        Ok(self.lookup(reference)?.data)
    }

    async fn delete_object(&self, request: &DeleteObjectRequest) -> Result<()> {
        self.deletes.lock().push(request.clone());

        let failing = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Delete(format!("injected failure for {}/{}", request.bucket, request.key)).into());
        }

        self.check_owner(&request.bucket, request.expected_bucket_owner.as_deref())?;
        self.remove_object(&request.bucket, &request.key);
        Ok(())
    }
}
