//! Core types for scanflow.
//!
//! This crate provides the data model shared by discovery and delivery:
//! - [`ObjectReference`] - Identity of one stored object
//! - [`PartitionKey`] / [`SourcePartition`] - Leaseable units of work
//! - [`ScanOptions`] - Per-bucket scan configuration and time windows
//! - [`GlobalScanState`] - Cursor that makes repeated scans incremental
//! - [`NotificationSource`] / [`OnErrorOption`] - Queue discovery settings

pub mod duration_secs;
pub mod notification;
pub mod owner;
pub mod partition;
pub mod reference;
pub mod scan;
pub mod state;

pub use notification::*;
pub use owner::*;
pub use partition::*;
pub use reference::*;
pub use scan::*;
pub use state::*;
