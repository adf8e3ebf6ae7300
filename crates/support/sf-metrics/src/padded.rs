//! Cache-line padded atomic counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache line size on most modern CPUs (64 bytes).
const CACHE_LINE_SIZE: usize = 64;

/// A cache-line-padded atomic counter.
///
/// Worker loops and acknowledgement callbacks on different threads bump
/// different counters concurrently; padding keeps each counter on its own
/// cache line.
#[repr(C, align(64))]
#[derive(Debug)]
pub(crate) struct PaddedAtomicU64 {
    value: AtomicU64,
    _padding: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicU64>()],
}

impl Default for PaddedAtomicU64 {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicU64>()],
        }
    }
}

impl PaddedAtomicU64 {
    #[inline]
    pub(crate) fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn add(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }
}
