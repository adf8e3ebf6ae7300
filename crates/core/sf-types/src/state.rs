//! Global scan state persisted by the coordinator between supplier runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cursor that makes repeated scans incremental.
///
/// Created empty, mutated once per supplier invocation, never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalScanState {
    /// Bucket name to the newest last-modified instant seen by a scan
    #[serde(default)]
    pub bucket_watermarks: BTreeMap<String, DateTime<Utc>>,

    /// Number of completed scans
    #[serde(default)]
    pub scan_count: u64,

    /// When the last scan finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_time: Option<DateTime<Utc>>,

    /// Set once an unscheduled source has done its one scan
    #[serde(default)]
    pub single_scan_complete: bool,
}

impl GlobalScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watermark recorded for `bucket`, if any.
    pub fn watermark(&self, bucket: &str) -> Option<DateTime<Utc>> {
        self.bucket_watermarks.get(bucket).copied()
    }

    /// Raise the watermark for `bucket`. Never lowers it.
    pub fn advance_watermark(&mut self, bucket: &str, seen: DateTime<Utc>) {
        self.bucket_watermarks
            .entry(bucket.to_string())
            .and_modify(|current| {
                if seen > *current {
                    *current = seen;
                }
            })
            .or_insert(seen);
    }

    /// Whether at least one scan ran.
    pub fn has_scanned(&self) -> bool {
        self.scan_count > 0
    }
}
