//! Deduplicating work queue with per-identity in-flight ownership.
//!
//! The queue guarantees that at most one worker reconciles a given resource
//! identity at a time. Items enqueued while their identity is being
//! processed are parked in a dirty map and re-queued when the worker calls
//! [`WorkQueue::done`], so a burst of notifications for one resource
//! collapses into a single follow-up reconciliation carrying the most
//! recent item.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::operator::item::{Item, ResourceIdentity};

#[derive(Default)]
struct QueueState {
    /// FIFO order of queued identities.
    order: VecDeque<ResourceIdentity>,
    /// Latest item per queued identity; re-adds replace the stored item.
    items: HashMap<ResourceIdentity, Item>,
    /// Identities currently owned by a worker or a retry timer.
    processing: HashSet<ResourceIdentity>,
    /// Items that arrived while their identity was being processed.
    dirty: HashMap<ResourceIdentity, Item>,
    /// Consecutive failures per identity, for backoff computation.
    failures: HashMap<ResourceIdentity, u32>,
    shutdown: bool,
}

pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("work queue mutex poisoned")
    }

    /// Enqueue an item, coalescing with any queued or in-flight item for the
    /// same identity. Non-blocking and safe to call from any task.
    pub(crate) fn add(&self, item: Item) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        let identity = item.identity().clone();
        if state.processing.contains(&identity) {
            state.dirty.insert(identity, item);
            return;
        }
        if state.items.insert(identity.clone(), item).is_none() {
            state.order.push_back(identity);
            metrics::QUEUE_DEPTH.set(state.order.len() as f64);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Wait for the next item, marking its identity as in-flight. Returns
    /// `None` once the queue has shut down or the token fires.
    pub(crate) async fn next(&self, stop: &CancellationToken) -> Option<Item> {
        loop {
            {
                let mut state = self.lock();
                if let Some(identity) = state.order.pop_front() {
                    metrics::QUEUE_DEPTH.set(state.order.len() as f64);
                    let item = state
                        .items
                        .remove(&identity)
                        .expect("queued identity without item");
                    state.processing.insert(identity);
                    return Some(item);
                }
                if state.shutdown {
                    return None;
                }
            }

            tokio::select! {
                _ = stop.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Release an identity after successful processing. Any item that
    /// arrived in the meantime is re-queued immediately.
    pub(crate) fn done(&self, identity: &ResourceIdentity) {
        let mut state = self.lock();
        state.processing.remove(identity);
        state.failures.remove(identity);
        if let Some(item) = state.dirty.remove(identity) {
            self.requeue_locked(&mut state, item);
        }
    }

    /// Record a failed attempt and return the attempt number (1-based).
    /// The identity stays owned until [`WorkQueue::release_retry`] or
    /// [`WorkQueue::abandon`] is called.
    pub(crate) fn record_failure(&self, identity: &ResourceIdentity) -> u32 {
        let mut state = self.lock();
        let attempts = state.failures.entry(identity.clone()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    /// Hand a retried item back to the queue once its backoff delay has
    /// elapsed. A fresher item delivered during the wait wins over the
    /// retried one.
    pub(crate) fn release_retry(&self, item: Item) {
        let mut state = self.lock();
        let identity = item.identity().clone();
        state.processing.remove(&identity);
        let item = state.dirty.remove(&identity).unwrap_or(item);
        self.requeue_locked(&mut state, item);
    }

    /// Release ownership of an identity without re-queueing, used when a
    /// retry timer is canceled by shutdown.
    pub(crate) fn abandon(&self, identity: &ResourceIdentity) {
        let mut state = self.lock();
        state.processing.remove(identity);
        state.dirty.remove(identity);
        state.failures.remove(identity);
    }

    pub(crate) fn shut_down(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        drop(state);
        self.notify.notify_waiters();
    }

    fn requeue_locked(&self, state: &mut QueueState, item: Item) {
        if state.shutdown {
            return;
        }
        let identity = item.identity().clone();
        if state.items.insert(identity.clone(), item).is_none() {
            state.order.push_back(identity);
            metrics::QUEUE_DEPTH.set(state.order.len() as f64);
            self.notify.notify_one();
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_len(&self) -> usize {
        self.lock().order.len()
    }
}
