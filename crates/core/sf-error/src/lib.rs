//! Error types and classification for scanflow.
//!
//! This crate provides:
//! - [`SfError`] - Top-level error enum for discovery, coordination and delivery
//! - Domain-specific errors ([`CoordinatorError`], [`QueueError`], [`StoreError`])
//! - [`ErrorCategory`] used by the worker loops to pick a reaction
//!   (give up, complete, retain, retry or stop)

use thiserror::Error;

/// Top-level error type for scanflow.
#[derive(Error, Debug)]
pub enum SfError {
    /// Lease coordination errors (never fatal to a worker loop)
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Queue errors (receive, delete, change visibility)
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Object store errors (list, head, get, delete)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A queue message body could not be parsed
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// Application-level backoff gave up
    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),

    /// The downstream object handler rejected an object
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by the partition ownership coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The partition does not exist (deleted, or never created)
    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    /// The partition exists but its lease belongs to another owner
    #[error("Partition not owned: {0}")]
    PartitionNotOwned(String),

    /// The coordinator store rejected the update
    #[error("Partition update failed: {0}")]
    PartitionUpdate(String),
}

/// Queue-related errors.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Failed to connect to the queue backend
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to receive messages
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Failed to delete messages
    #[error("Delete failed: {0}")]
    Delete(String),

    /// Failed to change a message's visibility timeout
    #[error("Change visibility failed: {0}")]
    ChangeVisibility(String),
}

/// Object store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object no longer exists
    #[error("No such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Access denied (includes expected bucket owner mismatch)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Listing failed
    #[error("List failed: {0}")]
    List(String),

    /// Metadata lookup failed
    #[error("Head failed: {0}")]
    Head(String),

    /// Content download failed
    #[error("Get failed: {0}")]
    Get(String),

    /// Object deletion failed
    #[error("Delete failed: {0}")]
    Delete(String),
}

/// Error classification used by the worker loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Infrastructure hiccup - retry later with backoff
    ///
    /// Examples: SQS receive failure, S3 throttling, network timeout
    Transient,

    /// Lease coordination failure - give up the partition and continue
    Lease,

    /// Object vanished between discovery and fetch - treat as delivered
    NotFound,

    /// Unparsable input - retain or delete per on-error policy
    Malformed,

    /// Permanent error - do not retry this unit of work
    ///
    /// Examples: access denied, invalid configuration, downstream rejection
    Permanent,

    /// Stops the calling worker loop
    Fatal,
}

/// Classifies an error to determine how a worker loop reacts to it.
pub fn classify_error(error: &SfError) -> ErrorCategory {
    match error {
        SfError::Coordinator(_) => ErrorCategory::Lease,
        SfError::Queue(_) => ErrorCategory::Transient,
        SfError::Store(e) => classify_store_error(e),
        SfError::MalformedNotification(_) => ErrorCategory::Malformed,
        SfError::RetriesExhausted(_) => ErrorCategory::Fatal,
        SfError::Delivery(_) => ErrorCategory::Permanent,
        SfError::Config(_) => ErrorCategory::Fatal,
        SfError::Other(e) => classify_anyhow_error(e),
    }
}

fn classify_store_error(error: &StoreError) -> ErrorCategory {
    match error {
        StoreError::NoSuchKey { .. } => ErrorCategory::NotFound,
        StoreError::AccessDenied(_) => ErrorCategory::Permanent,
        StoreError::List(_) => ErrorCategory::Transient,
        StoreError::Head(_) => ErrorCategory::Transient,
        StoreError::Get(_) => ErrorCategory::Transient,
        StoreError::Delete(_) => ErrorCategory::Transient,
    }
}

fn classify_anyhow_error(error: &anyhow::Error) -> ErrorCategory {
    if let Some(inner) = error.downcast_ref::<CoordinatorError>() {
        return match inner {
            CoordinatorError::PartitionNotFound(_)
            | CoordinatorError::PartitionNotOwned(_)
            | CoordinatorError::PartitionUpdate(_) => ErrorCategory::Lease,
        };
    }

    let err_string = error.to_string().to_lowercase();
    if err_string.contains("nosuchkey") || err_string.contains("404") {
        ErrorCategory::NotFound
    } else if err_string.contains("accessdenied") || err_string.contains("403") {
        ErrorCategory::Permanent
    } else {
        ErrorCategory::Transient
    }
}

impl SfError {
    /// Whether this error came from the lease coordinator.
    pub fn is_lease_error(&self) -> bool {
        classify_error(self) == ErrorCategory::Lease
    }

    /// Whether the referenced object no longer exists.
    pub fn is_not_found(&self) -> bool {
        classify_error(self) == ErrorCategory::NotFound
    }

    /// Shorthand for a missing partition.
    pub fn partition_not_found(key: impl Into<String>) -> Self {
        Self::Coordinator(CoordinatorError::PartitionNotFound(key.into()))
    }

    /// Shorthand for a partition leased by someone else.
    pub fn partition_not_owned(key: impl Into<String>) -> Self {
        Self::Coordinator(CoordinatorError::PartitionNotOwned(key.into()))
    }

    /// Shorthand for a missing object.
    pub fn no_such_key(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Store(StoreError::NoSuchKey {
            bucket: bucket.into(),
            key: key.into(),
        })
    }
}

/// Result type alias using SfError.
pub type Result<T> = std::result::Result<T, SfError>;
