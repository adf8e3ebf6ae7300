//! sf-discovery - Scan-based discovery for scanflow.
//!
//! This crate turns object store buckets into partitions:
//!
//! - [`ScanPartitionSupplier`] lists configured buckets and emits one
//!   partition per surviving object (or per folder prefix)
//! - Composable filters over listed objects (time window, key, watermark)
//! - An S3 [`ObjectStore`](sf_traits::ObjectStore) with LocalStack support
//! - A paginated listing stream and exponential backoff with jitter
//!
//! # Example
//!
//! ```ignore
//! use sf_discovery::{ScanConfig, ScanPartitionSupplier};
//! use sf_discovery::s3::{S3Config, S3ObjectStore};
//! use sf_types::ScanOptions;
//!
//! let store = S3ObjectStore::connect(&S3Config::new().with_region("us-east-1")).await?;
//! let config = ScanConfig::new().with_bucket(ScanOptions::new("my-bucket"));
//! let supplier = ScanPartitionSupplier::new(Arc::new(store), config);
//! ```

pub mod config;
pub mod filter;
pub mod s3;
pub mod supplier;

pub use config::ScanConfig;
pub use filter::{CompositeFilter, Filter, KeyFilter, WatermarkFilter, WindowFilter};
pub use s3::{ExponentialBackoff, RetryConfig, S3Config, S3ObjectStore, create_s3_client, list_all_objects};
pub use supplier::ScanPartitionSupplier;
