//! Reference [`ObjectHandler`](sf_traits::ObjectHandler) implementations.
//!
//! - [`StdoutObjectHandler`]: one JSON line per object
//! - [`StatsObjectHandler`]: object and byte counters

mod stats;
mod stdout;

pub use stats::{StatsObjectHandler, StatsReport};
pub use stdout::StdoutObjectHandler;
