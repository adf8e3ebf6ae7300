//! Queue client implementations.
//!
//! - [`SqsQueueClient`]: AWS SQS (production, LocalStack)
//!
//! The in-process queue used for local runs and tests lives in `sf-memory`.

mod sqs;

pub use sqs::SqsQueueClient;
