//! Application-level retry policy.

use std::time::Duration;

/// Delay policy for repeated failures of the same call site.
pub trait Backoff: Send + Sync {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// policy is exhausted.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}
