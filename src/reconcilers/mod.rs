// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciler plumbing shared by all controllers.
//!
//! A reconcile run returns a [`ReconcileStatus`] and the worker loop maps it
//! to a queue operation:
//!
//! | status | queue operation |
//! |---|---|
//! | `Succeeded` | `forget` (+ `add_after` when rescheduled) |
//! | `Repeat` | `add` (immediate retry, e.g. on conflicts) |
//! | `Delay` | `add_rate_limited` |
//! | `Failed` | `wait_for_change` (or `add_after` when rescheduled) |

pub mod endpoint;
pub mod events;
pub mod finalizers;
pub mod lb;
pub mod modify;
pub mod provider;
pub mod retry;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dns_errors::ControllerError;
use crate::healthz;
use crate::scheduler::WorkQueue;

/// Outcome of one reconcile run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// Work is done; optionally re-run after a delay
    Succeeded { reschedule: Option<Duration> },
    /// Re-run immediately (optimistic conflict)
    Repeat(String),
    /// Transient problem; re-run with rate limiting
    Delay(String),
    /// Terminal problem; wait for the next change unless rescheduled
    Failed {
        message: String,
        reschedule: Option<Duration>,
    },
}

impl ReconcileStatus {
    #[must_use]
    pub fn succeeded() -> Self {
        ReconcileStatus::Succeeded { reschedule: None }
    }

    #[must_use]
    pub fn succeeded_after(delay: Duration) -> Self {
        ReconcileStatus::Succeeded {
            reschedule: Some(delay),
        }
    }

    #[must_use]
    pub fn repeat(message: impl Into<String>) -> Self {
        ReconcileStatus::Repeat(message.into())
    }

    #[must_use]
    pub fn delay(message: impl Into<String>) -> Self {
        ReconcileStatus::Delay(message.into())
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        ReconcileStatus::Failed {
            message: message.into(),
            reschedule: None,
        }
    }

    #[must_use]
    pub fn failed_after(message: impl Into<String>, delay: Duration) -> Self {
        ReconcileStatus::Failed {
            message: message.into(),
            reschedule: Some(delay),
        }
    }

    /// Map a classified error to its disposition.
    #[must_use]
    pub fn from_error(err: &ControllerError) -> Self {
        match err {
            ControllerError::Conflict(msg) => ReconcileStatus::repeat(msg.clone()),
            ControllerError::Transient(msg) | ControllerError::NotFound(msg) => {
                ReconcileStatus::delay(msg.clone())
            }
            ControllerError::Invalid(msg) | ControllerError::Fatal(msg) => {
                ReconcileStatus::failed(msg.clone())
            }
        }
    }
}

/// One controller's reconcile entry point.
#[async_trait]
pub trait Reconciler<K>: Send + Sync {
    async fn reconcile(&self, key: &K) -> ReconcileStatus;
}

/// Single worker: pull keys to completion until cancelled or shut down.
///
/// Cancellation is observed between items only; the current item is always
/// drained.
pub async fn run_worker<K, R>(
    name: &str,
    worker_no: usize,
    queue: WorkQueue<K>,
    reconciler: Arc<R>,
    mut cancel: watch::Receiver<bool>,
) where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Reconciler<K> + ?Sized + 'static,
{
    info!(controller = name, worker = worker_no, "worker started");
    loop {
        let key = tokio::select! {
            changed = cancel.changed() => {
                match changed {
                    Ok(()) if !*cancel.borrow() => continue,
                    _ => break,
                }
            }
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };

        healthz::tick(name);
        debug!(controller = name, worker = worker_no, ?key, "reconciling");
        let status = reconciler.reconcile(&key).await;
        match status {
            ReconcileStatus::Succeeded { reschedule } => {
                queue.forget(&key);
                if let Some(delay) = reschedule {
                    queue.add_after(key.clone(), delay);
                }
            }
            ReconcileStatus::Repeat(message) => {
                warn!(controller = name, ?key, "repeating: {message}");
                queue.add(key.clone());
            }
            ReconcileStatus::Delay(message) => {
                warn!(controller = name, ?key, "delaying: {message}");
                queue.add_rate_limited(key.clone());
            }
            ReconcileStatus::Failed { message, reschedule } => {
                error!(controller = name, ?key, "failed: {message}");
                match reschedule {
                    Some(delay) => queue.add_after(key.clone(), delay),
                    None => queue.wait_for_change(key.clone()),
                }
            }
        }
        queue.done(&key);
    }
    info!(controller = name, worker = worker_no, "worker stopped");
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
