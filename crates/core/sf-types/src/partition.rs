//! Partition identity and progress state.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ObjectReference;

/// Separator between bucket and key (or folder prefix) in a partition key.
pub const PARTITION_KEY_SEPARATOR: char = '|';

/// Distributed identity of a unit of work.
///
/// `bucket|key` for object partitions, `bucket|prefix/` for folder
/// partitions. Bucket names cannot contain `|`, so the first separator
/// always splits bucket from the rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

/// What the creation supplier emits and the coordinator stores.
pub type PartitionIdentifier = PartitionKey;

impl PartitionKey {
    /// Wrap an already-formatted key.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key for a single object.
    pub fn for_object(bucket: &str, key: &str) -> Self {
        Self(format!("{bucket}{PARTITION_KEY_SEPARATOR}{key}"))
    }

    /// Key for a folder prefix.
    pub fn for_folder(bucket: &str, prefix: &str) -> Self {
        Self(format!("{bucket}{PARTITION_KEY_SEPARATOR}{prefix}"))
    }

    /// Split into `(bucket, key_or_prefix)`.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once(PARTITION_KEY_SEPARATOR)
    }

    /// Build the object reference for an object partition.
    pub fn to_object_reference(&self) -> Option<ObjectReference> {
        self.split()
            .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
            .map(|(bucket, key)| ObjectReference::new(bucket, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two fields of coordinator state this crate reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionProgressState {
    /// Epoch millis of the last time objects were found, or of the first
    /// empty observation. Folder partitions only.
    pub last_activity_millis: i64,

    /// Last key handed to delivery in a previous lease of a folder partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_key: Option<String>,
}

impl PartitionProgressState {
    /// Fresh state stamped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_activity_millis: now.timestamp_millis(),
            last_processed_key: None,
        }
    }

    /// Last activity as an instant.
    pub fn last_activity(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_activity_millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Record activity at `now`. Never moves the timestamp backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_millis = self.last_activity_millis.max(now.timestamp_millis());
    }
}

/// A partition currently leased to this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePartition {
    pub key: PartitionKey,
    pub progress_state: Option<PartitionProgressState>,
}

impl SourcePartition {
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            progress_state: None,
        }
    }

    pub fn with_state(mut self, state: PartitionProgressState) -> Self {
        self.progress_state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_partition_key() {
        let key = PartitionKey::for_object("bucket", "logs/2024/a.json");
        assert_eq!(key.as_str(), "bucket|logs/2024/a.json");
        assert_eq!(key.split(), Some(("bucket", "logs/2024/a.json")));

        let reference = key.to_object_reference().unwrap();
        assert_eq!(reference, ObjectReference::new("bucket", "logs/2024/a.json"));
    }

    #[test]
    fn test_key_containing_separator() {
        let key = PartitionKey::for_object("bucket", "odd|name.txt");
        assert_eq!(key.split(), Some(("bucket", "odd|name.txt")));
    }

    #[test]
    fn test_malformed_key_has_no_reference() {
        assert!(PartitionKey::new("no-separator").to_object_reference().is_none());
        assert!(PartitionKey::new("bucket|").to_object_reference().is_none());
    }

    #[test]
    fn test_folder_partition_key() {
        let key = PartitionKey::for_folder("bucket", "a/b/");
        assert_eq!(key.as_str(), "bucket|a/b/");
    }

    #[test]
    fn test_progress_state_touch_is_monotonic() {
        let t0 = Utc.timestamp_millis_opt(10_000).unwrap();
        let mut state = PartitionProgressState::new(t0);
        state.touch(Utc.timestamp_millis_opt(5_000).unwrap());
        assert_eq!(state.last_activity_millis, 10_000);
        state.touch(Utc.timestamp_millis_opt(20_000).unwrap());
        assert_eq!(state.last_activity(), Utc.timestamp_millis_opt(20_000).unwrap());
    }

    #[test]
    fn test_progress_state_serde() {
        let state = PartitionProgressState {
            last_activity_millis: 42,
            last_processed_key: Some("a/b/c".to_string()),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: PartitionProgressState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
