//! Scan configuration: buckets, time windows, scheduling and folder partitioning.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::DataSelection;

/// Default time a folder partition may stay empty before it is deleted.
pub const DEFAULT_EMPTY_FOLDER_GRACE: Duration = Duration::from_secs(60 * 60);

/// Half-open interval `[start, end)` on object last-modified times.
///
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Whether `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if instant < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if instant >= end {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Time window settings as configured, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    /// Only objects modified at or after this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Only objects modified before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Window length in seconds; anchored to start, end, or now
    #[serde(
        default,
        with = "crate::duration_secs::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub range: Option<Duration>,
}

impl ScanWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_range(mut self, range: Duration) -> Self {
        self.range = Some(range);
        self
    }

    /// Window anchored to an explicit start and/or end, if any is set.
    pub fn explicit(&self) -> Option<TimeWindow> {
        let range = self.range.and_then(|r| TimeDelta::from_std(r).ok());
        match (self.start_time, self.end_time, range) {
            (Some(start), Some(end), _) => Some(TimeWindow::new(Some(start), Some(end))),
            (Some(start), None, Some(range)) => Some(TimeWindow::new(
                Some(start),
                start.checked_add_signed(range),
            )),
            (None, Some(end), Some(range)) => {
                Some(TimeWindow::new(end.checked_sub_signed(range), Some(end)))
            }
            (Some(start), None, None) => Some(TimeWindow::new(Some(start), None)),
            (None, Some(end), None) => Some(TimeWindow::new(None, Some(end))),
            (None, None, _) => None,
        }
    }

    /// `[now - range, now)` when only a range is configured.
    pub fn relative_to(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let range = TimeDelta::from_std(self.range?).ok()?;
        Some(TimeWindow::new(now.checked_sub_signed(range), Some(now)))
    }

    pub fn is_empty(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none() && self.range.is_none()
    }
}

/// Per-bucket scan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Bucket to list
    pub bucket: String,

    /// Bucket-level window; overrides the global one when explicit
    #[serde(default, flatten)]
    pub window: ScanWindow,

    /// Only keys under these prefixes (one listing per prefix)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_prefixes: Vec<String>,

    /// Drop keys ending with any of these suffixes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_suffixes: Vec<String>,

    /// What the object handler reads for objects of this bucket
    #[serde(default)]
    pub data_selection: DataSelection,
}

impl ScanOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            window: ScanWindow::default(),
            include_prefixes: Vec::new(),
            exclude_suffixes: Vec::new(),
            data_selection: DataSelection::default(),
        }
    }

    pub fn with_window(mut self, window: ScanWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_include_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.include_prefixes.push(prefix.into());
        self
    }

    pub fn with_exclude_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.exclude_suffixes.push(suffix.into());
        self
    }

    pub fn with_data_selection(mut self, selection: DataSelection) -> Self {
        self.data_selection = selection;
        self
    }

    /// Resolve the window to apply for a scan starting at `now`.
    ///
    /// Precedence: explicit bucket bounds, explicit global bounds, bucket
    /// range relative to now, global range relative to now, unbounded.
    pub fn effective_window(&self, global: &ScanWindow, now: DateTime<Utc>) -> TimeWindow {
        self.window
            .explicit()
            .or_else(|| global.explicit())
            .or_else(|| self.window.relative_to(now))
            .or_else(|| global.relative_to(now))
            .unwrap_or_default()
    }

    /// Whether a key survives the exclude-suffix filter.
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude_suffixes.iter().any(|suffix| key.ends_with(suffix.as_str()))
    }
}

/// Repeated scan settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanScheduling {
    /// Minimum time between two scans
    #[serde(with = "crate::duration_secs")]
    pub interval: Duration,

    /// Total number of scans to run
    pub count: u64,
}

impl ScanScheduling {
    pub fn new(interval: Duration, count: u64) -> Self {
        Self { interval, count }
    }
}

/// Folder partitioning settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPartitioning {
    /// Number of leading path segments that form a folder
    pub depth: usize,

    /// Objects delivered per lease before the partition is given up
    pub max_objects_per_lease: usize,

    /// How long a folder may stay empty before its partition is deleted
    #[serde(
        default = "default_empty_folder_grace",
        with = "crate::duration_secs"
    )]
    pub empty_folder_grace: Duration,
}

fn default_empty_folder_grace() -> Duration {
    DEFAULT_EMPTY_FOLDER_GRACE
}

impl FolderPartitioning {
    pub fn new(depth: usize, max_objects_per_lease: usize) -> Self {
        Self {
            depth,
            max_objects_per_lease,
            empty_folder_grace: DEFAULT_EMPTY_FOLDER_GRACE,
        }
    }

    pub fn with_empty_folder_grace(mut self, grace: Duration) -> Self {
        self.empty_folder_grace = grace;
        self
    }

    /// Folder prefix of `key` at the configured depth, with trailing `/`.
    ///
    /// Keys with fewer than `depth + 1` segments have no folder.
    pub fn folder_prefix(&self, key: &str) -> Option<String> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments.len() < self.depth + 1 {
            return None;
        }
        let depth = self.depth.min(segments.len() - 1);
        Some(format!("{}/", segments[..depth].join("/")))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.depth == 0 {
            return Err("folder depth must be at least 1".to_string());
        }
        if self.max_objects_per_lease == 0 {
            return Err("max_objects_per_lease must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = TimeWindow::new(Some(at(100)), Some(at(200)));
        assert!(window.contains(at(100)));
        assert!(window.contains(at(199)));
        assert!(!window.contains(at(200)));
        assert!(!window.contains(at(99)));
        assert!(TimeWindow::unbounded().contains(at(0)));
    }

    #[test]
    fn test_bucket_window_overrides_global() {
        let global = ScanWindow::new().with_start_time(at(0)).with_end_time(at(1000));
        let options = ScanOptions::new("b")
            .with_window(ScanWindow::new().with_start_time(at(500)).with_end_time(at(600)));

        let window = options.effective_window(&global, at(5000));
        assert_eq!(window, TimeWindow::new(Some(at(500)), Some(at(600))));

        let options = ScanOptions::new("b");
        let window = options.effective_window(&global, at(5000));
        assert_eq!(window, TimeWindow::new(Some(at(0)), Some(at(1000))));
    }

    #[test]
    fn test_range_only_is_relative_to_now() {
        let global = ScanWindow::new().with_range(Duration::from_secs(60));
        let options = ScanOptions::new("b");

        let window = options.effective_window(&global, at(1000));
        assert_eq!(window, TimeWindow::new(Some(at(940)), Some(at(1000))));

        // Recomputed per scan
        let window = options.effective_window(&global, at(2000));
        assert_eq!(window, TimeWindow::new(Some(at(1940)), Some(at(2000))));
    }

    #[test]
    fn test_start_plus_range() {
        let window = ScanWindow::new()
            .with_start_time(at(100))
            .with_range(Duration::from_secs(50))
            .explicit()
            .unwrap();
        assert_eq!(window, TimeWindow::new(Some(at(100)), Some(at(150))));

        let window = ScanWindow::new()
            .with_end_time(at(100))
            .with_range(Duration::from_secs(50))
            .explicit()
            .unwrap();
        assert_eq!(window, TimeWindow::new(Some(at(50)), Some(at(100))));
    }

    #[test]
    fn test_nothing_configured_is_unbounded() {
        let window = ScanOptions::new("b").effective_window(&ScanWindow::default(), at(10));
        assert!(window.is_unbounded());
    }

    #[test]
    fn test_exclude_suffix() {
        let options = ScanOptions::new("b").with_exclude_suffix(".invalid");
        assert!(options.is_excluded("x/b.invalid"));
        assert!(!options.is_excluded("x/a.csv"));
    }

    #[test]
    fn test_folder_prefix() {
        let folders = FolderPartitioning::new(2, 10);
        assert_eq!(folders.folder_prefix("a/b/c/file.json"), Some("a/b/".to_string()));
        assert_eq!(folders.folder_prefix("a/b/file.json"), Some("a/b/".to_string()));
        assert_eq!(folders.folder_prefix("a/file.json"), None);
        assert_eq!(folders.folder_prefix("file.json"), None);
    }

    #[test]
    fn test_folder_validate() {
        assert!(FolderPartitioning::new(1, 1).validate().is_ok());
        assert!(FolderPartitioning::new(0, 1).validate().is_err());
        assert!(FolderPartitioning::new(1, 0).validate().is_err());
        assert_eq!(FolderPartitioning::new(1, 1).empty_folder_grace, DEFAULT_EMPTY_FOLDER_GRACE);
    }

    #[test]
    fn test_scan_options_yaml() {
        let yaml = r#"
bucket: my-bucket
start_time: "2024-01-01T00:00:00Z"
range: 3600
include_prefixes: ["logs/"]
exclude_suffixes: [".tmp"]
data_selection: metadata_only
"#;
        let options: ScanOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.bucket, "my-bucket");
        assert_eq!(options.window.range, Some(Duration::from_secs(3600)));
        assert!(options.window.start_time.is_some());
        assert_eq!(options.include_prefixes, vec!["logs/".to_string()]);
        assert_eq!(options.data_selection, DataSelection::MetadataOnly);
    }
}
