//! sf-metrics - Source metrics for scanflow.
//!
//! Every observable the pipeline exposes is a [`MetricCounter`]: a local
//! padded atomic (read back by tests and by the CLI summary) mirrored into
//! an OpenTelemetry counter. When an OTLP endpoint is configured the
//! counters are exported periodically; otherwise the global no-op meter
//! is used.
//!
//! # Example
//!
//! ```ignore
//! use sf_metrics::{MetricsConfig, SourceMetrics};
//!
//! let metrics = SourceMetrics::new(
//!     MetricsConfig::new("orders-source").with_otlp_endpoint("http://localhost:4317"),
//! )?;
//! metrics.sqs_messages_received.add(10);
//! ```

mod padded;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::Resource;
use padded::PaddedAtomicU64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for metrics collection.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Source identifier, added as a dimension to all metrics.
    pub source_id: String,

    /// Service name for metrics attribution.
    pub service_name: String,

    /// OTLP endpoint for exporting metrics (optional).
    pub otlp_endpoint: Option<String>,

    /// Export interval in seconds.
    pub export_interval_secs: u64,
}

impl MetricsConfig {
    /// Create a new metrics configuration for a source.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            service_name: "scanflow".to_string(),
            otlp_endpoint: None,
            export_interval_secs: 10,
        }
    }

    /// Set the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the OTLP endpoint for metric export.
    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Set the export interval in seconds.
    pub fn with_export_interval(mut self, interval_secs: u64) -> Self {
        self.export_interval_secs = interval_secs;
        self
    }
}

/// A monotonically increasing counter, readable locally.
pub struct MetricCounter {
    local: PaddedAtomicU64,
    otel: Counter<u64>,
    attributes: Arc<[KeyValue]>,
}

impl MetricCounter {
    fn new(meter: &Meter, name: &'static str, description: &'static str, attributes: Arc<[KeyValue]>) -> Self {
        Self {
            local: PaddedAtomicU64::default(),
            otel: meter.u64_counter(name).with_description(description).build(),
            attributes,
        }
    }

    pub fn add(&self, value: u64) {
        if value == 0 {
            return;
        }
        self.local.add(value);
        self.otel.add(value, &self.attributes);
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.local.load()
    }
}

impl std::fmt::Debug for MetricCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCounter").field("value", &self.get()).finish()
    }
}

/// Duration distribution with local count and sum.
pub struct DurationHistogram {
    count: PaddedAtomicU64,
    total_ms: PaddedAtomicU64,
    otel: Histogram<f64>,
    attributes: Arc<[KeyValue]>,
}

impl DurationHistogram {
    pub fn record(&self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        self.count.add(1);
        self.total_ms.add(duration.as_millis() as u64);
        self.otel.record(ms, &self.attributes);
    }

    pub fn count(&self) -> u64 {
        self.count.load()
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms.load()
    }
}

/// All counters published by scan workers and queue pollers.
pub struct SourceMetrics {
    source_id: String,

    /// Queue messages received
    pub sqs_messages_received: MetricCounter,
    /// Queue messages deleted
    pub sqs_messages_deleted: MetricCounter,
    /// Queue messages whose body could not be parsed
    pub sqs_messages_failed: MetricCounter,
    /// Queue messages whose delete failed
    pub sqs_messages_delete_failed: MetricCounter,
    /// Successful visibility extensions
    pub sqs_visibility_timeout_changed: MetricCounter,
    /// Failed visibility extensions
    pub sqs_visibility_timeout_change_failed: MetricCounter,
    /// Time from event to dispatch
    pub sqs_message_delay: DurationHistogram,
    /// Notifications that decoded to zero object references
    pub empty_notifications: MetricCounter,

    /// Acknowledgement completion callbacks fired
    pub acknowledgement_set_callbacks: MetricCounter,
    /// Empty folder partition observations
    pub folder_partition_no_objects_found: MetricCounter,
    /// Lease renewals that failed inside progress checks
    pub partition_ownership_update_errors: MetricCounter,

    /// Objects handed to the downstream handler
    pub objects_delivered: MetricCounter,
    /// Objects the downstream handler rejected
    pub objects_delivery_failed: MetricCounter,
    /// Objects that vanished before delivery
    pub objects_not_found: MetricCounter,
    /// Objects deleted after acknowledged delivery
    pub objects_deleted: MetricCounter,
    /// Object deletions that failed after all retries
    pub objects_delete_failed: MetricCounter,

    /// Partitions completed
    pub partitions_completed: MetricCounter,
    /// Partitions given up
    pub partitions_given_up: MetricCounter,
    /// Partitions deleted
    pub partitions_deleted: MetricCounter,

    /// Meter provider (kept alive for the duration of metrics collection).
    meter_provider: Option<SdkMeterProvider>,
}

impl SourceMetrics {
    /// Create metrics, installing an OTLP exporter if an endpoint is configured.
    pub fn new(config: MetricsConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        info!(
            source_id = %config.source_id,
            service_name = %config.service_name,
            otlp_endpoint = ?config.otlp_endpoint,
            "Initializing source metrics"
        );

        let meter_provider = if let Some(endpoint) = &config.otlp_endpoint {
            let resource = Resource::new(vec![KeyValue::new("service.name", config.service_name.clone())]);

            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            let reader = PeriodicReader::builder(exporter, runtime::Tokio)
                .with_interval(Duration::from_secs(config.export_interval_secs))
                .build();

            let provider = MeterProviderBuilder::default()
                .with_resource(resource)
                .with_reader(reader)
                .build();

            global::set_meter_provider(provider.clone());
            Some(provider)
        } else {
            debug!("No OTLP endpoint configured, metrics will not be exported");
            None
        };

        Ok(Self::build(config, meter_provider))
    }

    /// Metrics that are counted locally but never exported.
    pub fn noop() -> Self {
        Self::build(MetricsConfig::new("noop"), None)
    }

    fn build(config: MetricsConfig, meter_provider: Option<SdkMeterProvider>) -> Self {
        let meter = global::meter("scanflow");
        let attrs: Arc<[KeyValue]> = Arc::from(vec![
            KeyValue::new("source_id", config.source_id.clone()),
            KeyValue::new("service", config.service_name.clone()),
        ]);
        let counter = |name: &'static str, description: &'static str| {
            MetricCounter::new(&meter, name, description, attrs.clone())
        };

        Self {
            sqs_messages_received: counter("scanflow.sqs.messages.received", "Queue messages received"),
            sqs_messages_deleted: counter("scanflow.sqs.messages.deleted", "Queue messages deleted"),
            sqs_messages_failed: counter("scanflow.sqs.messages.failed", "Queue messages that failed to parse"),
            sqs_messages_delete_failed: counter(
                "scanflow.sqs.messages.delete_failed",
                "Queue messages that could not be deleted",
            ),
            sqs_visibility_timeout_changed: counter(
                "scanflow.sqs.visibility.changed",
                "Visibility timeout extensions",
            ),
            sqs_visibility_timeout_change_failed: counter(
                "scanflow.sqs.visibility.change_failed",
                "Failed visibility timeout extensions",
            ),
            sqs_message_delay: DurationHistogram {
                count: PaddedAtomicU64::default(),
                total_ms: PaddedAtomicU64::default(),
                otel: meter
                    .f64_histogram("scanflow.sqs.message.delay")
                    .with_description("Time between the object event and its dispatch")
                    .with_unit("ms")
                    .build(),
                attributes: attrs.clone(),
            },
            empty_notifications: counter(
                "scanflow.sqs.notifications.empty",
                "Notifications without object created records",
            ),
            acknowledgement_set_callbacks: counter(
                "scanflow.acknowledgements.callbacks",
                "Acknowledgement completion callbacks",
            ),
            folder_partition_no_objects_found: counter(
                "scanflow.folder.no_objects_found",
                "Empty folder partition observations",
            ),
            partition_ownership_update_errors: counter(
                "scanflow.partition.ownership_update_errors",
                "Failed lease renewals",
            ),
            objects_delivered: counter("scanflow.objects.delivered", "Objects handed to the handler"),
            objects_delivery_failed: counter("scanflow.objects.delivery_failed", "Objects rejected downstream"),
            objects_not_found: counter("scanflow.objects.not_found", "Objects missing at delivery time"),
            objects_deleted: counter("scanflow.objects.deleted", "Objects deleted on read"),
            objects_delete_failed: counter("scanflow.objects.delete_failed", "Failed object deletions"),
            partitions_completed: counter("scanflow.partitions.completed", "Partitions completed"),
            partitions_given_up: counter("scanflow.partitions.given_up", "Partitions given up"),
            partitions_deleted: counter("scanflow.partitions.deleted", "Partitions deleted"),
            source_id: config.source_id,
            meter_provider,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Serializable copy of all local values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sqs_messages_received: self.sqs_messages_received.get(),
            sqs_messages_deleted: self.sqs_messages_deleted.get(),
            sqs_messages_failed: self.sqs_messages_failed.get(),
            sqs_messages_delete_failed: self.sqs_messages_delete_failed.get(),
            sqs_visibility_timeout_changed: self.sqs_visibility_timeout_changed.get(),
            sqs_visibility_timeout_change_failed: self.sqs_visibility_timeout_change_failed.get(),
            sqs_message_delay_count: self.sqs_message_delay.count(),
            sqs_message_delay_total_ms: self.sqs_message_delay.total_ms(),
            empty_notifications: self.empty_notifications.get(),
            acknowledgement_set_callbacks: self.acknowledgement_set_callbacks.get(),
            folder_partition_no_objects_found: self.folder_partition_no_objects_found.get(),
            partition_ownership_update_errors: self.partition_ownership_update_errors.get(),
            objects_delivered: self.objects_delivered.get(),
            objects_delivery_failed: self.objects_delivery_failed.get(),
            objects_not_found: self.objects_not_found.get(),
            objects_deleted: self.objects_deleted.get(),
            objects_delete_failed: self.objects_delete_failed.get(),
            partitions_completed: self.partitions_completed.get(),
            partitions_given_up: self.partitions_given_up.get(),
            partitions_deleted: self.partitions_deleted.get(),
        }
    }

    /// Flush pending exports and stop the exporter.
    pub fn shutdown(&self) {
        if let Some(provider) = &self.meter_provider {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Error shutting down meter provider");
            }
        }
        debug!("Source metrics shutdown complete");
    }
}

impl std::fmt::Debug for SourceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMetrics")
            .field("source_id", &self.source_id)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// A serializable snapshot of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sqs_messages_received: u64,
    pub sqs_messages_deleted: u64,
    pub sqs_messages_failed: u64,
    pub sqs_messages_delete_failed: u64,
    pub sqs_visibility_timeout_changed: u64,
    pub sqs_visibility_timeout_change_failed: u64,
    pub sqs_message_delay_count: u64,
    pub sqs_message_delay_total_ms: u64,
    pub empty_notifications: u64,
    pub acknowledgement_set_callbacks: u64,
    pub folder_partition_no_objects_found: u64,
    pub partition_ownership_update_errors: u64,
    pub objects_delivered: u64,
    pub objects_delivery_failed: u64,
    pub objects_not_found: u64,
    pub objects_deleted: u64,
    pub objects_delete_failed: u64,
    pub partitions_completed: u64,
    pub partitions_given_up: u64,
    pub partitions_deleted: u64,
}

impl MetricsSnapshot {
    /// Mean event-to-dispatch delay.
    pub fn mean_message_delay(&self) -> Option<Duration> {
        (self.sqs_message_delay_count > 0)
            .then(|| Duration::from_millis(self.sqs_message_delay_total_ms / self.sqs_message_delay_count))
    }
}
