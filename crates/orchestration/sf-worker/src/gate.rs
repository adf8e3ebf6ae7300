//! Operator switch that pauses claiming new work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable that closes every gate in the process while set.
pub const STOP_PROCESSING_ENV: &str = "SCANFLOW_STOP_PROCESSING";

const DEFAULT_CLOSED_WAIT: Duration = Duration::from_secs(5);

/// Shared pause switch for worker loops.
///
/// While closed, loops sleep for [`closed_wait`](Self::closed_wait) instead
/// of claiming partitions or receiving messages. In-flight work and its
/// acknowledgement callbacks are unaffected.
#[derive(Debug, Clone)]
pub struct ProcessingGate {
    paused: Arc<AtomicBool>,
    closed_wait: Duration,
    check_env: bool,
}

impl Default for ProcessingGate {
    fn default() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            closed_wait: DEFAULT_CLOSED_WAIT,
            check_env: true,
        }
    }
}

impl ProcessingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closed_wait(mut self, wait: Duration) -> Self {
        self.closed_wait = wait;
        self
    }

    /// Ignore the environment variable (tests).
    pub fn without_env(mut self) -> Self {
        self.check_env = false;
        self
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        if self.paused.load(Ordering::SeqCst) {
            return false;
        }
        !(self.check_env && std::env::var_os(STOP_PROCESSING_ENV).is_some())
    }

    pub fn closed_wait(&self) -> Duration {
        self.closed_wait
    }
}
