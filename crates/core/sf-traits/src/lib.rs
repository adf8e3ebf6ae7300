//! Interfaces consumed by scanflow.
//!
//! The core never talks to a concrete backend. Everything it needs from
//! the outside is expressed here:
//!
//! - [`SourceCoordinator`] - Lease-based partition ownership
//! - [`PartitionCreationSupplier`] - Scan-based partition discovery
//! - [`QueueClient`] - Notification queue (receive, batch delete, visibility)
//! - [`ObjectStore`] - Object listing, metadata, content and deletion
//! - [`AcknowledgementSetManager`] - End-to-end delivery acknowledgements
//! - [`ObjectHandler`] - Downstream buffer that consumes object references
//! - [`Backoff`] - Application-level retry policy

pub mod acknowledgement;
pub mod backoff;
pub mod coordinator;
pub mod handler;
pub mod queue;
pub mod store;

pub use acknowledgement::*;
pub use backoff::*;
pub use coordinator::*;
pub use handler::*;
pub use queue::*;
pub use store::*;
