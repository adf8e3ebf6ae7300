//! Main execution logic for the scanflow CLI.

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use sf_discovery::{S3Config, S3ObjectStore, ScanPartitionSupplier};
use sf_error::SfError;
use sf_memory::{InMemoryAcknowledgementSetManager, InMemoryCoordinator};
use sf_metrics::{MetricsConfig, MetricsSnapshot, SourceMetrics};
use sf_traits::{ObjectHandler, ObjectStore, QueueClient};
use sf_worker::{
    DeliveryCoordinator, NotificationDecoder, ObjectDeleter, ProcessingGate, QueuePoller, ScanWorker, SourceConfig,
    SqsQueueClient, StatsObjectHandler, StatsReport, StdoutObjectHandler,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::args::{Cli, DestinationType};

/// What a finished run reports.
pub struct RunSummary {
    pub metrics: MetricsSnapshot,
    pub stats: Option<StatsReport>,
    pub elapsed: Duration,
    /// Loops that ended with an error instead of a stop
    pub failed_loops: usize,
}

/// Load the source config and overlay command line settings.
fn load_config(args: &Cli) -> Result<SourceConfig> {
    let mut config = SourceConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if !args.mode.runs_scan() {
        config.scan = None;
    }
    if !args.mode.runs_queue() {
        config.sqs = None;
    }

    config.validate().map_err(|e| anyhow!("{e}"))?;
    Ok(config)
}

fn s3_config(args: &Cli) -> S3Config {
    let mut config = S3Config::new().with_region(&args.region);
    if let Some(endpoint) = &args.s3_endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let (Some(access_key), Some(secret_key)) = (&args.access_key, &args.secret_key) {
        config = config.with_credentials(access_key, secret_key);
    }
    if let Some(profile) = &args.profile {
        config = config.with_profile(profile);
    }
    config
}

/// Run every configured loop until Ctrl-C or until all of them end.
pub async fn execute(args: Cli) -> Result<RunSummary> {
    let started = Instant::now();
    let config = load_config(&args)?;

    let mut metrics_config = MetricsConfig::new(&args.source_id);
    if let Some(endpoint) = &args.otlp_endpoint {
        metrics_config = metrics_config.with_otlp_endpoint(endpoint);
    }
    let metrics = Arc::new(SourceMetrics::new(metrics_config).map_err(|e| anyhow!("metrics setup failed: {e}"))?);

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(&s3_config(&args)).await);

    // Create handler
    let mut stats_handler = None;
    let handler: Arc<dyn ObjectHandler> = match args.destination {
        DestinationType::Stdout => Arc::new(StdoutObjectHandler::new(Arc::clone(&store))),
        DestinationType::Stats => {
            let handler = Arc::new(StatsObjectHandler::new(Arc::clone(&store)));
            stats_handler = Some(Arc::clone(&handler));
            handler
        }
    };

    let mut delivery = DeliveryCoordinator::new(handler, Arc::clone(&metrics))
        .with_acknowledgment_timeout(config.acknowledgment_timeout)
        .with_lease_renewal_interval(config.lease_renewal_interval)
        .with_failure_policy(config.acknowledgment_failure_policy);
    if config.acknowledgments {
        delivery = delivery.with_acknowledgements(Arc::new(InMemoryAcknowledgementSetManager::new()));
    }
    if config.delete_on_read {
        delivery = delivery.with_deleter(
            ObjectDeleter::new(Arc::clone(&store), Arc::clone(&metrics))
                .with_retry(config.delete_attempts, config.delete_retry_delay),
        );
    }
    let delivery = Arc::new(delivery);
    let gate = ProcessingGate::new();

    let mut scan_workers = Vec::new();
    if let Some(scan) = &config.scan {
        let coordinator = InMemoryCoordinator::new();
        let supplier = Arc::new(
            ScanPartitionSupplier::new(Arc::clone(&store), scan.clone())
                .with_bucket_owners(config.bucket_owners.clone())
                .with_delete_on_read(config.delete_on_read),
        );
        for i in 0..config.workers {
            let worker = ScanWorker::new(
                Arc::new(coordinator.for_owner(format!("worker-{i}"))),
                supplier.clone(),
                Arc::clone(&store),
                Arc::clone(&delivery),
                scan,
            )
            .with_bucket_owners(config.bucket_owners.clone())
            .with_gate(gate.clone())
            .with_idle_wait(config.idle_wait);
            scan_workers.push(Arc::new(worker));
        }
        info!(workers = config.workers, buckets = scan.buckets.len(), "Starting scan workers");
    }

    let mut pollers = Vec::new();
    if let Some(sqs) = &config.sqs {
        let queue: Arc<dyn QueueClient> = match &args.sqs_endpoint {
            Some(endpoint) => Arc::new(SqsQueueClient::from_config_with_endpoint(sqs, endpoint, &args.region).await),
            None => Arc::new(SqsQueueClient::from_config(sqs).await),
        };
        for _ in 0..config.workers {
            let decoder =
                NotificationDecoder::new(config.notification_source).with_bucket_owners(config.bucket_owners.clone());
            let poller = QueuePoller::new(Arc::clone(&queue), decoder, Arc::clone(&delivery), sqs.clone())
                .with_on_error(config.on_error)
                .with_data_selection(config.data_selection)
                .with_gate(gate.clone());
            pollers.push(Arc::new(poller));
        }
        info!(pollers = config.workers, queue = %sqs.queue_url, "Starting queue pollers");
    }

    let mut handles: Vec<JoinHandle<sf_error::Result<()>>> = Vec::new();
    for worker in &scan_workers {
        let worker = Arc::clone(worker);
        handles.push(tokio::spawn(async move { worker.run().await }));
    }
    for poller in &pollers {
        let poller = Arc::clone(poller);
        handles.push(tokio::spawn(async move { poller.run().await }));
    }
    if handles.is_empty() {
        bail!("no discovery loops to run for mode {:?}", args.mode);
    }

    let loops = join_all(handles);
    tokio::pin!(loops);
    let results = tokio::select! {
        results = &mut loops => results,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
            }
            info!("Stopping discovery loops");
            for worker in &scan_workers {
                worker.stop();
            }
            for poller in &pollers {
                poller.stop();
            }
            match tokio::time::timeout(Duration::from_secs(args.shutdown_timeout), &mut loops).await {
                Ok(results) => results,
                Err(_) => {
                    warn!(timeout_secs = args.shutdown_timeout, "Loops did not finish before the shutdown timeout");
                    Vec::new()
                }
            }
        }
    };

    let mut failed_loops = 0;
    for result in results {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed_loops += 1;
                match &e {
                    SfError::RetriesExhausted(_) => error!(error = %e, "Loop gave up after repeated queue failures"),
                    _ => error!(error = %e, "Loop failed"),
                }
            }
            Err(e) => {
                failed_loops += 1;
                error!(error = %e, "Loop task panicked");
            }
        }
    }

    metrics.shutdown();

    Ok(RunSummary {
        metrics: metrics.snapshot(),
        stats: stats_handler.map(|handler| handler.get_stats()),
        elapsed: started.elapsed(),
        failed_loops,
    })
}
