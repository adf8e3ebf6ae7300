//! S3 access for discovery and delivery.
//!
//! - Client configuration with LocalStack support
//! - [`S3ObjectStore`], the aws-sdk-s3 implementation of `ObjectStore`
//! - Paginated listing as a stream
//! - Exponential backoff with jitter

mod client;
mod list;
mod retry;
mod store;

pub use client::{S3Config, create_s3_client};
pub use list::list_all_objects;
pub use retry::{ExponentialBackoff, RetryConfig, with_retry};
pub use store::S3ObjectStore;
