//! Configuration types for scan-based discovery.

use serde::{Deserialize, Serialize};
use sf_types::{FolderPartitioning, ScanOptions, ScanScheduling, ScanWindow, PARTITION_KEY_SEPARATOR};

/// Configuration for scan-based discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Buckets to scan. The same bucket may appear more than once with
    /// different include prefixes.
    pub buckets: Vec<ScanOptions>,

    /// Window applied to buckets that do not configure their own
    #[serde(default, flatten)]
    pub window: ScanWindow,

    /// Repeated scans; a single scan when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<ScanScheduling>,

    /// Lease folders instead of single objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_partitioning: Option<FolderPartitioning>,
}

impl ScanConfig {
    /// Create an empty scan configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bucket to scan.
    pub fn with_bucket(mut self, options: ScanOptions) -> Self {
        self.buckets.push(options);
        self
    }

    /// Set the global time window.
    pub fn with_window(mut self, window: ScanWindow) -> Self {
        self.window = window;
        self
    }

    /// Enable repeated scans.
    pub fn with_scheduling(mut self, scheduling: ScanScheduling) -> Self {
        self.scheduling = Some(scheduling);
        self
    }

    /// Enable folder partitions.
    pub fn with_folder_partitioning(mut self, folders: FolderPartitioning) -> Self {
        self.folder_partitioning = Some(folders);
        self
    }

    /// Whether partitions are folder prefixes rather than objects.
    pub fn uses_folder_partitions(&self) -> bool {
        self.folder_partitioning.is_some()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.buckets.is_empty() {
            return Err("scan requires at least one bucket".to_string());
        }
        for options in &self.buckets {
            if options.bucket.is_empty() {
                return Err("bucket name cannot be empty".to_string());
            }
            if options.bucket.contains(PARTITION_KEY_SEPARATOR) {
                return Err(format!(
                    "bucket name '{}' cannot contain '{PARTITION_KEY_SEPARATOR}'",
                    options.bucket
                ));
            }
        }
        if let Some(scheduling) = &self.scheduling {
            if scheduling.count == 0 {
                return Err("scheduling count must be at least 1".to_string());
            }
        }
        if let Some(folders) = &self.folder_partitioning {
            folders.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_scan_config_builder() {
        let config = ScanConfig::new()
            .with_bucket(ScanOptions::new("logs"))
            .with_scheduling(ScanScheduling::new(Duration::from_secs(60), 3))
            .with_folder_partitioning(FolderPartitioning::new(2, 100));

        assert_eq!(config.buckets.len(), 1);
        assert!(config.uses_folder_partitions());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_config_validation() {
        assert!(ScanConfig::new().validate().is_err());

        let config = ScanConfig::new().with_bucket(ScanOptions::new("bad|name"));
        assert!(config.validate().is_err());

        let config = ScanConfig::new()
            .with_bucket(ScanOptions::new("logs"))
            .with_scheduling(ScanScheduling::new(Duration::from_secs(60), 0));
        assert!(config.validate().is_err());

        let config = ScanConfig::new()
            .with_bucket(ScanOptions::new("logs"))
            .with_folder_partitioning(FolderPartitioning::new(0, 10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_config_from_yaml() {
        let yaml = r#"
buckets:
  - bucket: logs
    include_prefixes: ["app/"]
    exclude_suffixes: [".tmp"]
  - bucket: audit
    start_time: "2024-01-01T00:00:00Z"
range: 86400
scheduling:
  interval: 300
  count: 12
folder_partitioning:
  depth: 1
  max_objects_per_lease: 50
"#;
        let config: ScanConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.buckets.len(), 2);
        assert_eq!(config.buckets[0].include_prefixes, vec!["app/".to_string()]);
        assert!(config.buckets[1].window.start_time.is_some());
        assert_eq!(config.window.range, Some(Duration::from_secs(86400)));
        assert_eq!(config.scheduling.unwrap().count, 12);
        let folders = config.folder_partitioning.unwrap();
        assert_eq!(folders.empty_folder_grace, sf_types::DEFAULT_EMPTY_FOLDER_GRACE);
        assert!(config.validate().is_ok());
    }
}
