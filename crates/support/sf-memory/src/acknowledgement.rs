//! Timer-driven acknowledgement sets.
//!
//! Each set fires its completion callback exactly once: with the combined
//! result once [`complete`](AcknowledgementSet::complete) was called and every
//! added handle has been released, or with `false` when the timeout elapses
//! first. Callbacks run on spawned tokio tasks, never under the set's lock.

use parking_lot::Mutex;
use sf_traits::{
    AcknowledgementSet, AcknowledgementSetManager, CompletionCallback, DeliveryHandle, ProgressCheck,
    ProgressCheckCallback,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

struct SetState {
    pending: HashSet<DeliveryHandle>,
    total: usize,
    failed: bool,
    completed: bool,
    fired: bool,
    callback: Option<CompletionCallback>,
}

struct SetInner {
    state: Mutex<SetState>,
    done: watch::Sender<bool>,
}

impl SetInner {
    fn progress(&self) -> ProgressCheck {
        let state = self.state.lock();
        ProgressCheck {
            pending: state.pending.len(),
            total: state.total,
        }
    }

    fn is_fired(&self) -> bool {
        self.state.lock().fired
    }

    fn fire(&self, result: bool) {
        let callback = {
            let mut state = self.state.lock();
            if state.fired {
                return;
            }
            state.fired = true;
            state.callback.take()
        };
        self.done.send_replace(true);

        trace!(result, "Acknowledgement set fired");
        if let Some(callback) = callback {
            tokio::spawn(callback(result));
        }
    }

    fn fire_if_settled(&self) {
        let result = {
            let state = self.state.lock();
            if state.fired || !state.completed || !state.pending.is_empty() {
                return;
            }
            !state.failed
        };
        self.fire(result);
    }
}

async fn wait_until_fired(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|finished| *finished).await;
}

/// One group of in-flight handles.
#[derive(Clone)]
pub struct InMemoryAcknowledgementSet {
    inner: Arc<SetInner>,
}

impl InMemoryAcknowledgementSet {
    fn new(callback: CompletionCallback) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(SetInner {
                state: Mutex::new(SetState {
                    pending: HashSet::new(),
                    total: 0,
                    failed: false,
                    completed: false,
                    fired: false,
                    callback: Some(callback),
                }),
                done,
            }),
        }
    }

    /// Current pending/total counts.
    pub fn progress(&self) -> ProgressCheck {
        self.inner.progress()
    }

    fn start_timeout(&self, timeout: Duration) {
        let inner = Arc::clone(&self.inner);
        let mut done = inner.done.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    if !inner.is_fired() {
                        debug!(?timeout, "Acknowledgement set timed out");
                        inner.fire(false);
                    }
                }
                _ = wait_until_fired(&mut done) => {}
            }
        });
    }
}

impl AcknowledgementSet for InMemoryAcknowledgementSet {
    fn add(&self, handle: DeliveryHandle) {
        let mut state = self.inner.state.lock();
        if state.pending.insert(handle) {
            state.total += 1;
        }
    }

    fn release(&self, handle: DeliveryHandle, success: bool) {
        {
            let mut state = self.inner.state.lock();
            if !state.pending.remove(&handle) {
                trace!(%handle, "Release of unknown handle ignored");
                return;
            }
            if !success {
                state.failed = true;
            }
        }
        self.inner.fire_if_settled();
    }

    fn add_progress_check(&self, callback: ProgressCheckCallback, interval: Duration) {
        let inner = Arc::clone(&self.inner);
        let mut done = inner.done.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if inner.is_fired() {
                            break;
                        }
                        callback(inner.progress()).await;
                    }
                    _ = wait_until_fired(&mut done) => break,
                }
            }
        });
    }

    fn complete(&self) {
        self.inner.state.lock().completed = true;
        self.inner.fire_if_settled();
    }

    fn is_done(&self) -> bool {
        self.inner.is_fired()
    }
}

/// Creates [`InMemoryAcknowledgementSet`]s. Requires a tokio runtime.
#[derive(Default)]
pub struct InMemoryAcknowledgementSetManager {
    created: AtomicUsize,
}

impl InMemoryAcknowledgementSetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sets created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl AcknowledgementSetManager for InMemoryAcknowledgementSetManager {
    fn create(&self, on_completion: CompletionCallback, timeout: Duration) -> Arc<dyn AcknowledgementSet> {
        self.created.fetch_add(1, Ordering::Relaxed);
        let set = InMemoryAcknowledgementSet::new(on_completion);
        set.start_timeout(timeout);
        Arc::new(set)
    }
}
