//! In-process backends for scanflow.
//!
//! These implement the interfaces from `sf-traits` without any network
//! dependency. They back single-process runs of the CLI and serve as the
//! test doubles for the worker crates:
//!
//! - [`InMemoryCoordinator`] - Lease-based partition ownership
//! - [`InMemoryObjectStore`] - Sorted, paginated object store
//! - [`InMemoryQueue`] - Queue with scriptable failures
//! - [`InMemoryAcknowledgementSetManager`] - Timer-driven acknowledgement sets

pub mod acknowledgement;
pub mod coordinator;
pub mod queue;
pub mod store;

pub use acknowledgement::{InMemoryAcknowledgementSet, InMemoryAcknowledgementSetManager};
pub use coordinator::{InMemoryCoordinator, PartitionStatus};
pub use queue::InMemoryQueue;
pub use store::InMemoryObjectStore;
