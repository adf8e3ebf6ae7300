//! Filters over listed objects.
//!
//! Every filter answers one question about an [`ObjectSummary`]. The scan
//! supplier combines them per bucket with a [`CompositeFilter`].

mod composite;
mod key;
mod window;

pub use composite::CompositeFilter;
pub use key::KeyFilter;
pub use window::{WatermarkFilter, WindowFilter};

use sf_types::ObjectSummary;

/// A predicate over listed objects.
pub trait Filter: Send + Sync {
    /// Whether the object survives this filter.
    fn matches(&self, obj: &ObjectSummary) -> bool;

    /// Human-readable description for logging.
    fn description(&self) -> String;
}
