//! In-process notification queue.

use async_trait::async_trait;
use parking_lot::Mutex;
use sf_error::{QueueError, Result};
use sf_traits::{BatchDeleteOutcome, DeleteEntry, FailedDelete, QueueClient, QueueMessage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct QueueState {
    visible: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: Vec<String>,
    visibility_changes: Vec<(String, Duration)>,
}

/// A FIFO queue with receive/delete failures that tests can script.
///
/// Received messages move in flight until deleted; [`requeue_in_flight`]
/// plays the part of an expired visibility timeout.
///
/// [`requeue_in_flight`]: InMemoryQueue::requeue_in_flight
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    failing_receives: AtomicU32,
    always_fail_receives: AtomicBool,
    failing_delete_ids: Mutex<HashSet<String>>,
    fail_delete_calls: AtomicBool,
    next_id: AtomicU64,
    receive_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body, returning its message id.
    pub fn send(&self, body: impl Into<String>) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = QueueMessage::new(format!("msg-{n}"), format!("receipt-{n}"), body);
        let id = message.message_id.clone();
        self.state.lock().visible.push_back(message);
        id
    }

    /// Fail the next `count` receive calls.
    pub fn fail_next_receives(&self, count: u32) {
        self.failing_receives.store(count, Ordering::SeqCst);
    }

    /// Fail every receive call from now on.
    pub fn fail_all_receives(&self) {
        self.always_fail_receives.store(true, Ordering::SeqCst);
    }

    /// Report the given message id as failed in batch deletes.
    pub fn fail_delete_of(&self, message_id: impl Into<String>) {
        self.failing_delete_ids.lock().insert(message_id.into());
    }

    /// Make the batch delete call itself fail.
    pub fn fail_delete_calls(&self, fail: bool) {
        self.fail_delete_calls.store(fail, Ordering::SeqCst);
    }

    /// Return all in-flight messages to the visible queue.
    pub fn requeue_in_flight(&self) {
        let mut state = self.state.lock();
        let mut returning: Vec<QueueMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        returning.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        state.visible.extend(returning);
    }

    pub fn visible_len(&self) -> usize {
        self.state.lock().visible.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Message ids deleted so far, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// `(receipt_handle, timeout)` for every visibility change.
    pub fn visibility_changes(&self) -> Vec<(String, Duration)> {
        self.state.lock().visibility_changes.clone()
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive_messages(&self, max: usize) -> Result<Vec<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.always_fail_receives.load(Ordering::SeqCst) {
            return Err(QueueError::Receive("injected receive failure".to_string()).into());
        }

        let mut state = self.state.lock();
        let count = max.min(state.visible.len());
        let batch: Vec<QueueMessage> = state.visible.drain(..count).collect();
        for message in &batch {
            state
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
        }
        Ok(batch)
    }

    async fn delete_message_batch(&self, entries: &[DeleteEntry]) -> Result<BatchDeleteOutcome> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete_calls.load(Ordering::SeqCst) {
            return Err(QueueError::Delete("injected batch delete failure".to_string()).into());
        }

        let failing = self.failing_delete_ids.lock().clone();
        let mut state = self.state.lock();
        let mut outcome = BatchDeleteOutcome::default();
        for entry in entries {
            if failing.contains(&entry.id) {
                outcome.failed.push(FailedDelete {
                    id: entry.id.clone(),
                    code: "InternalError".to_string(),
                    message: Some("injected delete failure".to_string()),
                });
                continue;
            }
            state.in_flight.remove(&entry.receipt_handle);
            state.deleted.push(entry.id.clone());
            outcome.succeeded.push(entry.id.clone());
        }
        Ok(outcome)
    }

    async fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        if !state.in_flight.contains_key(receipt_handle) {
            return Err(QueueError::ChangeVisibility(format!(
                "receipt handle {receipt_handle} is not in flight"
            ))
            .into());
        }
        state
            .visibility_changes
            .push((receipt_handle.to_string(), timeout));
        Ok(())
    }
}
