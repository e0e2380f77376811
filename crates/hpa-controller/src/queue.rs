//! Keyed work queue with at-least-once delivery.
//!
//! A key is queued at most once. A key added while a worker holds it is
//! marked dirty and re-queued when the worker calls [`WorkQueue::done`], so
//! no update is lost and no two workers ever hold the same key.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<String>,
    /// Keys waiting to be processed (queued, or re-queued after `done`).
    dirty: HashSet<String>,
    /// Keys currently held by a worker.
    processing: HashSet<String>,
    shutting_down: bool,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key as needing reconciliation.
    pub async fn add(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.shutting_down || state.dirty.contains(key) {
            return;
        }
        state.dirty.insert(key.to_string());
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);
        self.notify.notify_one();
    }

    /// Add a key after `delay`, without blocking the caller.
    pub fn add_after(self: &Arc<Self>, key: &str, delay: Duration) {
        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(%key, delay_ms = delay.as_millis() as u64, "requeue after backoff");
            queue.add(&key).await;
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release a key; re-queue it if it was added while held.
    pub async fn done(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shut_down(&self) {
        self.state.lock().await.shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Number of keys waiting to be handed out.
    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
