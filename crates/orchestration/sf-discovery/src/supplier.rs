//! Scan-based partition creation.
//!
//! The coordinator calls [`ScanPartitionSupplier::apply`] whenever it runs out
//! of work. Each call is one scan pass over every configured bucket: list,
//! filter, emit one partition per surviving object (or folder), and advance
//! the per-bucket watermarks in the global state so the next pass only sees
//! newer objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sf_error::Result;
use sf_traits::{ObjectStore, PartitionCreationSupplier};
use sf_types::{BucketOwners, GlobalScanState, PartitionIdentifier, PartitionKey, ScanOptions};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ScanConfig;
use crate::filter::{CompositeFilter, Filter, KeyFilter, WatermarkFilter, WindowFilter};
use crate::s3::list_all_objects;

/// Emits partitions by listing the configured buckets.
pub struct ScanPartitionSupplier {
    store: Arc<dyn ObjectStore>,
    config: ScanConfig,
    owners: BucketOwners,
    delete_on_read: bool,
}

impl ScanPartitionSupplier {
    pub fn new(store: Arc<dyn ObjectStore>, config: ScanConfig) -> Self {
        Self {
            store,
            config,
            owners: BucketOwners::default(),
            delete_on_read: false,
        }
    }

    /// Expected bucket owners passed on listing calls.
    pub fn with_bucket_owners(mut self, owners: BucketOwners) -> Self {
        self.owners = owners;
        self
    }

    /// Objects are deleted after delivery, so the watermark filter is not
    /// needed to avoid rediscovering them.
    pub fn with_delete_on_read(mut self, delete_on_read: bool) -> Self {
        self.delete_on_read = delete_on_read;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Whether a pass should run now. Records the end of a one-shot scan.
    fn should_scan(&self, state: &mut GlobalScanState, now: DateTime<Utc>) -> bool {
        match &self.config.scheduling {
            None => {
                if state.has_scanned() {
                    state.single_scan_complete = true;
                    return false;
                }
                true
            }
            Some(scheduling) => {
                if state.scan_count >= scheduling.count {
                    return false;
                }
                match (state.last_scan_time, chrono::Duration::from_std(scheduling.interval)) {
                    (Some(last), Ok(interval)) => now - interval > last,
                    _ => true,
                }
            }
        }
    }

    fn filter_for(
        &self,
        options: &ScanOptions,
        previous_watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CompositeFilter {
        let window = options.effective_window(&self.config.window, now);
        let watermark = previous_watermark
            .filter(|_| self.config.scheduling.is_some() && !self.delete_on_read)
            .map(|watermark| Box::new(WatermarkFilter::new(watermark)) as Box<dyn Filter>);

        CompositeFilter::new()
            .with_filter(Box::new(
                KeyFilter::new().with_exclude_suffixes(options.exclude_suffixes.iter().cloned()),
            ))
            .with_filter(Box::new(WindowFilter::new(window)))
            .with_optional_filter(watermark)
    }

    fn partition_for(&self, bucket: &str, key: &str) -> Option<PartitionIdentifier> {
        match &self.config.folder_partitioning {
            Some(folders) => folders
                .folder_prefix(key)
                .map(|prefix| PartitionKey::for_folder(bucket, &prefix)),
            None => Some(PartitionKey::for_object(bucket, key)),
        }
    }
}

#[async_trait]
impl PartitionCreationSupplier for ScanPartitionSupplier {
    async fn apply(&self, state: &mut GlobalScanState) -> Result<Vec<PartitionIdentifier>> {
        let now = Utc::now();
        if !self.should_scan(state, now) {
            debug!(scan_count = state.scan_count, "Skipping scan");
            return Ok(Vec::new());
        }

        // Every pass filters against the watermarks as they were before it
        // started, even when a bucket is configured more than once.
        let previous = state.bucket_watermarks.clone();
        let mut newest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut emitted: HashSet<PartitionIdentifier> = HashSet::new();
        let mut identifiers = Vec::new();

        for options in &self.config.buckets {
            let bucket = options.bucket.as_str();
            let filter = self.filter_for(options, previous.get(bucket).copied(), now);
            let owner = self.owners.owner_for(bucket);
            debug!(bucket, filter = %filter.description(), "Scanning bucket");

            let prefixes: Vec<Option<&str>> = if options.include_prefixes.is_empty() {
                vec![None]
            } else {
                options.include_prefixes.iter().map(|p| Some(p.as_str())).collect()
            };

            for prefix in prefixes {
                let objects = list_all_objects(self.store.as_ref(), bucket, prefix, owner);
                futures::pin_mut!(objects);

                while let Some(object) = objects.try_next().await? {
                    if !filter.matches(&object) {
                        continue;
                    }
                    if let Some(modified) = object.last_modified {
                        let entry = newest.entry(bucket.to_string()).or_insert(modified);
                        if modified > *entry {
                            *entry = modified;
                        }
                    }
                    if let Some(identifier) = self.partition_for(bucket, &object.key) {
                        if emitted.insert(identifier.clone()) {
                            identifiers.push(identifier);
                        }
                    }
                }
            }
        }

        for (bucket, modified) in newest {
            state.advance_watermark(&bucket, modified);
        }
        state.scan_count += 1;
        state.last_scan_time = Some(now);

        info!(
            scan_count = state.scan_count,
            partitions = identifiers.len(),
            "Scan complete"
        );
        Ok(identifiers)
    }
}
