//! sf-worker - Object delivery for scanflow.
//!
//! This crate turns discovered partitions and queue notifications into
//! calls on an [`ObjectHandler`](sf_traits::ObjectHandler). It provides:
//!
//! - [`ScanWorker`]: claims scan partitions from the coordinator, delivers
//!   single objects or folder batches, and checkpoints folder progress
//! - [`QueuePoller`]: receives S3 or EventBridge notifications, delivers
//!   the referenced objects and deletes handled messages
//! - [`DeliveryCoordinator`]: acknowledgement sets, lease renewal from
//!   progress checks and delete-after-delivery
//! - Reference handlers: stdout and stats
//!
//! # Example
//!
//! ```ignore
//! use sf_worker::{DeliveryCoordinator, QueuePoller, SqsQueueClient, StatsObjectHandler};
//!
//! let queue = Arc::new(SqsQueueClient::from_config(&options).await);
//! let handler = Arc::new(StatsObjectHandler::new(store));
//! let delivery = Arc::new(DeliveryCoordinator::new(handler, metrics));
//!
//! let poller = QueuePoller::new(queue, NotificationDecoder::new(source), delivery, options);
//! poller.run().await?;
//! ```

pub mod config;
pub mod delivery;
pub mod destination;
pub mod gate;
pub mod lease;
pub mod notification;
pub mod poller;
pub mod scan;
pub mod source;

pub use config::{AcknowledgmentFailurePolicy, SourceConfig, SqsOptions};
pub use delivery::{DeliveryCoordinator, ObjectDeleter, PartitionAcknowledgements};
pub use destination::{StatsObjectHandler, StatsReport, StdoutObjectHandler};
pub use gate::{ProcessingGate, STOP_PROCESSING_ENV};
pub use lease::{CompletionOutcome, PartitionLease};
pub use notification::{NotificationDecoder, ObjectNotification};
pub use poller::QueuePoller;
pub use scan::ScanWorker;
pub use source::SqsQueueClient;
