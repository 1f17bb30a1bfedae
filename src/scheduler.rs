// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rate-limited, deduplicating work queue for reconcile keys.
//!
//! Each controller owns one queue; workers block on [`WorkQueue::get`] and
//! acknowledge with [`WorkQueue::done`]. The queue guarantees that a key is
//! held by at most one worker at a time: keys enqueued while being processed
//! are marked dirty and re-queued on `done`, so concurrent events collapse
//! instead of running twice.
//!
//! Four producer operations map to the reconcile dispositions:
//!
//! - [`WorkQueue::add`] - immediate, deduplicating
//! - [`WorkQueue::add_rate_limited`] - delayed by per-key exponential backoff
//!   with jitter; a no-op for keys parked by `wait_for_change`
//! - [`WorkQueue::add_changed`] - clears backoff and parking, enqueues
//!   immediately; used when the resource version actually changed
//! - [`WorkQueue::wait_for_change`] - parks a key until the next `add_changed`
//!
//! [`WorkQueue::add_after`] schedules self-requeued housekeeping ticks.
//! Shutdown is idempotent and wakes all blocked `get` calls.

use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Base delay for the first rate-limited retry of a key
const BACKOFF_BASE_MILLIS: u64 = 1_000;

/// Upper bound for per-key retry delays
const BACKOFF_MAX_SECS: u64 = 300;

/// Jitter applied to retry delays to avoid thundering herds
const BACKOFF_JITTER: f64 = 0.1;

struct QueueState<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty: HashSet<K>,
    parked: HashSet<K>,
    failures: HashMap<K, u32>,
}

impl<K: Clone + Eq + Hash> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            dirty: HashSet::new(),
            parked: HashSet::new(),
            failures: HashMap::new(),
        }
    }
}

struct Inner<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    notify: Notify,
    shutdown: AtomicBool,
}

/// Deduplicating rate-limited work queue. Cheap to clone.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    fn enqueue(&self, key: K) {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Enqueue `key` for immediate processing.
    pub fn add(&self, key: K) {
        self.enqueue(key);
    }

    /// Enqueue `key` after its per-key backoff delay.
    ///
    /// Keys parked by [`WorkQueue::wait_for_change`] are ignored until the
    /// next [`WorkQueue::add_changed`].
    pub fn add_rate_limited(&self, key: K) {
        let attempts = {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            if state.parked.contains(&key) {
                debug!(queue = %self.inner.name, ?key, "parked key, dropping rate-limited add");
                return;
            }
            let attempts = state.failures.entry(key.clone()).or_insert(0);
            *attempts += 1;
            *attempts
        };
        self.add_after(key, Self::backoff_delay(attempts));
    }

    /// Clear error and parking state for `key` and enqueue it immediately.
    pub fn add_changed(&self, key: K) {
        {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.parked.remove(&key);
            state.failures.remove(&key);
        }
        self.enqueue(key);
    }

    /// Enqueue `key` after `delay`.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.enqueue(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(key);
        });
    }

    /// Park `key`: it will not be reprocessed on rate-limited adds until the
    /// next [`WorkQueue::add_changed`].
    pub fn wait_for_change(&self, key: K) {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        state.parked.insert(key);
    }

    /// Reset the backoff counter for `key`.
    pub fn forget(&self, key: &K) {
        let mut state = self.inner.state.lock().expect("queue state poisoned");
        state.failures.remove(key);
    }

    /// Whether `key` is currently parked waiting for a change.
    #[must_use]
    pub fn is_parked(&self, key: &K) -> bool {
        let state = self.inner.state.lock().expect("queue state poisoned");
        state.parked.contains(key)
    }

    /// Dequeue the next key, blocking until one is available.
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut state = self.inner.state.lock().expect("queue state poisoned");
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if self.inner.shutdown.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Acknowledge completion of `key`. Keys that saw events while being
    /// processed are re-queued.
    pub fn done(&self, key: &K) {
        let requeue = {
            let mut state = self.inner.state.lock().expect("queue state poisoned");
            state.processing.remove(key);
            state.dirty.remove(key)
        };
        if requeue {
            self.enqueue(key.clone());
        }
    }

    /// Shut the queue down, waking every blocked [`WorkQueue::get`].
    /// Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Number of keys waiting in the queue (excluding in-flight keys).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("queue state poisoned").queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn backoff_delay(attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        let base = BACKOFF_BASE_MILLIS.saturating_mul(1u64 << exp);
        let capped = base.min(BACKOFF_MAX_SECS * 1_000);
        let jitter = {
            let mut rng = rand::thread_rng();
            let delta = capped as f64 * BACKOFF_JITTER;
            rng.gen_range(-delta..=delta)
        };
        let millis = (capped as f64 + jitter).max(0.0) as u64;
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
