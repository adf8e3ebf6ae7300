//! Source configuration.
//!
//! One YAML document configures queue-based discovery (`sqs`), scan-based
//! discovery (`scan`), or both, plus the delivery settings shared by them.

use serde::{Deserialize, Serialize};
use sf_discovery::ScanConfig;
use sf_error::{Result, SfError};
use sf_types::{BucketOwners, DataSelection, NotificationSource, OnErrorOption};
use std::path::Path;
use std::time::Duration;

/// Largest batch a single receive call may return.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Longest long-poll wait the queue accepts.
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

/// What happens to a partition whose acknowledgement set failed or timed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgmentFailurePolicy {
    /// Complete the partition without deleting the object
    #[default]
    Complete,
    /// Release the partition so it is delivered again
    GiveUp,
}

/// Queue polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqsOptions {
    /// Queue URL
    pub queue_url: String,

    /// Messages per receive call (1-10)
    #[serde(default = "default_maximum_messages")]
    pub maximum_messages: usize,

    /// Long-polling wait (0-20 seconds)
    #[serde(default = "default_wait_time", with = "sf_types::duration_secs")]
    pub wait_time: Duration,

    /// Visibility timeout requested on receive and on every extension
    #[serde(default = "default_visibility_timeout", with = "sf_types::duration_secs")]
    pub visibility_timeout: Duration,

    /// Keep extending visibility while acknowledgements are pending
    #[serde(default)]
    pub visibility_duplication_protection: bool,

    /// Upper bound on the total visibility granted to one message
    #[serde(
        default = "default_visibility_duplicate_protection_timeout",
        with = "sf_types::duration_secs"
    )]
    pub visibility_duplicate_protection_timeout: Duration,

    /// Pause after every non-empty polling cycle
    #[serde(default, with = "sf_types::duration_secs")]
    pub poll_delay: Duration,
}

fn default_maximum_messages() -> usize {
    MAX_RECEIVE_BATCH
}

fn default_wait_time() -> Duration {
    MAX_WAIT_TIME
}

fn default_visibility_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_visibility_duplicate_protection_timeout() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

impl SqsOptions {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            maximum_messages: default_maximum_messages(),
            wait_time: default_wait_time(),
            visibility_timeout: default_visibility_timeout(),
            visibility_duplication_protection: false,
            visibility_duplicate_protection_timeout: default_visibility_duplicate_protection_timeout(),
            poll_delay: Duration::ZERO,
        }
    }

    /// Set the receive batch size, clamped to 1-10.
    pub fn with_maximum_messages(mut self, count: usize) -> Self {
        self.maximum_messages = count.clamp(1, MAX_RECEIVE_BATCH);
        self
    }

    /// Set the long-polling wait, capped at 20 seconds.
    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait.min(MAX_WAIT_TIME);
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Extend visibility of pending messages, up to `timeout` in total.
    pub fn with_visibility_duplicate_protection(mut self, timeout: Duration) -> Self {
        self.visibility_duplication_protection = true;
        self.visibility_duplicate_protection_timeout = timeout;
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Copy with out-of-range values pulled into the accepted ranges.
    pub fn clamped(&self) -> Self {
        self.clone()
            .with_maximum_messages(self.maximum_messages)
            .with_wait_time(self.wait_time)
    }

    /// Interval between visibility extensions: half the visibility timeout
    /// minus one second.
    pub fn progress_interval(&self) -> Duration {
        (self.visibility_timeout / 2).saturating_sub(Duration::from_secs(1))
    }

    /// Timeout of the acknowledgement set created per message.
    pub fn acknowledgment_timeout(&self) -> Duration {
        if self.visibility_duplication_protection {
            self.visibility_duplicate_protection_timeout
        } else {
            self.visibility_timeout.saturating_sub(Duration::from_secs(2))
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.queue_url.is_empty() {
            return Err("sqs.queue_url cannot be empty".to_string());
        }
        if self.visibility_duplication_protection {
            if self.visibility_duplicate_protection_timeout <= self.visibility_timeout {
                return Err(
                    "sqs.visibility_duplicate_protection_timeout must be greater than sqs.visibility_timeout"
                        .to_string(),
                );
            }
            if self.progress_interval().is_zero() {
                return Err("sqs.visibility_timeout must be at least 4 seconds with duplicate protection".to_string());
            }
        }
        Ok(())
    }
}

/// Configuration for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Queue-based discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqs: Option<SqsOptions>,

    /// Scan-based discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanConfig>,

    /// Wire format of queue notifications
    #[serde(default)]
    pub notification_source: NotificationSource,

    /// Handling of unparsable queue messages
    #[serde(default)]
    pub on_error: OnErrorOption,

    /// End-to-end acknowledgements
    #[serde(default)]
    pub acknowledgments: bool,

    /// Delete objects once their delivery is acknowledged
    #[serde(default)]
    pub delete_on_read: bool,

    /// Timeout of the acknowledgement sets created for scan partitions
    #[serde(default = "default_acknowledgment_timeout", with = "sf_types::duration_secs")]
    pub acknowledgment_timeout: Duration,

    #[serde(default)]
    pub acknowledgment_failure_policy: AcknowledgmentFailurePolicy,

    /// Expected bucket owners
    #[serde(default)]
    pub bucket_owners: BucketOwners,

    /// What the handler reads for queue-discovered objects
    #[serde(default)]
    pub data_selection: DataSelection,

    /// Concurrent loops per discovery mode
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often pending partitions renew their lease
    #[serde(default = "default_lease_renewal_interval", with = "sf_types::duration_secs")]
    pub lease_renewal_interval: Duration,

    /// Sleep when no partition is available
    #[serde(default = "default_idle_wait", with = "sf_types::duration_secs")]
    pub idle_wait: Duration,

    /// Attempts per object deletion
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    /// Pause between deletion attempts
    #[serde(default = "default_delete_retry_delay", with = "sf_types::duration_secs")]
    pub delete_retry_delay: Duration,
}

fn default_acknowledgment_timeout() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_workers() -> usize {
    1
}

fn default_lease_renewal_interval() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_idle_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_delete_attempts() -> u32 {
    3
}

fn default_delete_retry_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sqs: None,
            scan: None,
            notification_source: NotificationSource::default(),
            on_error: OnErrorOption::default(),
            acknowledgments: false,
            delete_on_read: false,
            acknowledgment_timeout: default_acknowledgment_timeout(),
            acknowledgment_failure_policy: AcknowledgmentFailurePolicy::default(),
            bucket_owners: BucketOwners::default(),
            data_selection: DataSelection::default(),
            workers: default_workers(),
            lease_renewal_interval: default_lease_renewal_interval(),
            idle_wait: default_idle_wait(),
            delete_attempts: default_delete_attempts(),
            delete_retry_delay: default_delete_retry_delay(),
        }
    }
}

impl SourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document. Queue options are clamped, not rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: SourceConfig =
            serde_yaml::from_str(yaml).map_err(|e| SfError::Config(format!("invalid source config: {e}")))?;
        config.sqs = config.sqs.as_ref().map(SqsOptions::clamped);
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SfError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_sqs(mut self, sqs: SqsOptions) -> Self {
        self.sqs = Some(sqs);
        self
    }

    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = Some(scan);
        self
    }

    pub fn with_notification_source(mut self, source: NotificationSource) -> Self {
        self.notification_source = source;
        self
    }

    pub fn with_on_error(mut self, on_error: OnErrorOption) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_acknowledgments(mut self, enabled: bool) -> Self {
        self.acknowledgments = enabled;
        self
    }

    pub fn with_delete_on_read(mut self, enabled: bool) -> Self {
        self.delete_on_read = enabled;
        self
    }

    pub fn with_acknowledgment_timeout(mut self, timeout: Duration) -> Self {
        self.acknowledgment_timeout = timeout;
        self
    }

    pub fn with_acknowledgment_failure_policy(mut self, policy: AcknowledgmentFailurePolicy) -> Self {
        self.acknowledgment_failure_policy = policy;
        self
    }

    pub fn with_bucket_owners(mut self, owners: BucketOwners) -> Self {
        self.bucket_owners = owners;
        self
    }

    pub fn with_data_selection(mut self, selection: DataSelection) -> Self {
        self.data_selection = selection;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_lease_renewal_interval(mut self, interval: Duration) -> Self {
        self.lease_renewal_interval = interval;
        self
    }

    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    pub fn with_delete_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.delete_attempts = attempts;
        self.delete_retry_delay = delay;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sqs.is_none() && self.scan.is_none() {
            return Err("at least one of sqs or scan must be configured".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.delete_on_read && !self.acknowledgments {
            return Err("delete_on_read requires acknowledgments".to_string());
        }
        if self.delete_attempts == 0 {
            return Err("delete_attempts must be at least 1".to_string());
        }
        if self.lease_renewal_interval.is_zero() {
            return Err("lease_renewal_interval must be positive".to_string());
        }
        if let Some(sqs) = &self.sqs {
            sqs.validate()?;
            if sqs.visibility_duplication_protection && !self.acknowledgments {
                return Err("sqs.visibility_duplication_protection requires acknowledgments".to_string());
            }
        }
        if let Some(scan) = &self.scan {
            scan.validate()?;
        }
        Ok(())
    }
}
