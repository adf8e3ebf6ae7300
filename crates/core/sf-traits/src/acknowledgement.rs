//! End-to-end acknowledgement interfaces.
//!
//! An [`AcknowledgementSet`] groups the delivery handles of one unit of
//! work. The owner registers a completion callback when the set is created
//! and, optionally, a periodic progress check. Both callbacks run on
//! whatever task the acknowledgement subsystem chooses, so everything they
//! touch must be captured by value when they are registered.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Invoked exactly once with `true` when every handle was acknowledged
/// positively, or `false` on a negative acknowledgement or timeout.
pub type CompletionCallback = Box<dyn FnOnce(bool) -> BoxFuture<'static, ()> + Send>;

/// Invoked on a fixed interval while the set is still pending.
pub type ProgressCheckCallback = Arc<dyn Fn(ProgressCheck) -> BoxFuture<'static, ()> + Send + Sync>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token for one delivered record or object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryHandle(u64);

impl DeliveryHandle {
    /// Allocate a process-unique handle.
    pub fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Snapshot passed to progress checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCheck {
    /// Handles still awaiting acknowledgement
    pub pending: usize,

    /// Handles ever added
    pub total: usize,
}

impl ProgressCheck {
    /// Fraction of handles still pending (0.0 when none were added).
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.pending as f64 / self.total as f64
        }
    }
}

/// A group of in-flight delivery handles.
pub trait AcknowledgementSet: Send + Sync {
    /// Track a handle. Must be called before the handle's record is handed on.
    fn add(&self, handle: DeliveryHandle);

    /// Acknowledge a handle, positively or negatively.
    fn release(&self, handle: DeliveryHandle, success: bool);

    /// Register a callback fired every `interval` until the set completes.
    fn add_progress_check(&self, callback: ProgressCheckCallback, interval: Duration);

    /// No more handles will be added. The completion callback fires once
    /// every added handle is released (immediately if none are pending).
    fn complete(&self);

    /// Whether the completion callback already fired.
    fn is_done(&self) -> bool;
}

/// Creates acknowledgement sets.
pub trait AcknowledgementSetManager: Send + Sync {
    /// Create a set that fires `on_completion` once, with `false` if
    /// `timeout` elapses first.
    fn create(&self, on_completion: CompletionCallback, timeout: Duration) -> Arc<dyn AcknowledgementSet>;
}
