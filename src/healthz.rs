// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Liveness heartbeats for controller loops.
//!
//! Every worker pool ticks a named heartbeat each time it dequeues work.
//! `GET /healthz` returns 200 only while every registered heartbeat has been
//! ticked within its timeout; otherwise 503 with a plain-text report of the
//! outdated names. The default timeout is `2 * interval + 120s` so a single
//! slow DNS tick does not flip liveness.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::constants::HEARTBEAT_SLACK_SECS;

struct Heartbeat {
    last: Instant,
    timeout: Duration,
}

static HEARTBEATS: LazyLock<Mutex<HashMap<String, Heartbeat>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Default heartbeat timeout for a loop rescheduling itself every `interval`.
#[must_use]
pub fn default_timeout(interval_secs: u64) -> Duration {
    Duration::from_secs(2 * interval_secs + HEARTBEAT_SLACK_SECS)
}

/// Register or refresh the heartbeat for `name` with an explicit timeout.
pub fn start(name: &str, timeout: Duration) {
    let mut beats = HEARTBEATS.lock().expect("heartbeat map poisoned");
    beats.insert(
        name.to_string(),
        Heartbeat {
            last: Instant::now(),
            timeout,
        },
    );
}

/// Refresh the heartbeat for `name`, keeping its registered timeout.
pub fn tick(name: &str) {
    let mut beats = HEARTBEATS.lock().expect("heartbeat map poisoned");
    match beats.get_mut(name) {
        Some(beat) => beat.last = Instant::now(),
        None => {
            beats.insert(
                name.to_string(),
                Heartbeat {
                    last: Instant::now(),
                    timeout: default_timeout(crate::constants::DEFAULT_INTERVAL_SECS),
                },
            );
        }
    }
}

/// Deregister the heartbeat for `name` (used on controlled shutdown so a
/// stopped loop does not report as dead).
pub fn end(name: &str) {
    HEARTBEATS
        .lock()
        .expect("heartbeat map poisoned")
        .remove(name);
}

/// Liveness summary: `(healthy, report)`.
///
/// The report lists every outdated heartbeat as `<name>: <age>s ago`, one
/// per line, and is empty while everything is fresh.
#[must_use]
pub fn health_info() -> (bool, String) {
    let beats = HEARTBEATS.lock().expect("heartbeat map poisoned");
    let mut report = String::new();
    let mut healthy = true;

    for (name, beat) in beats.iter() {
        let age = beat.last.elapsed();
        if age > beat.timeout {
            warn!(name, age_secs = age.as_secs(), "outdated heartbeat");
            report.push_str(&format!("{}: {}s ago\n", name, age.as_secs()));
            healthy = false;
        }
    }
    (healthy, report)
}

/// Axum handler for `GET /healthz`.
pub async fn healthz_handler() -> (axum::http::StatusCode, String) {
    let (healthy, report) = health_info();
    if healthy {
        (axum::http::StatusCode::OK, "ok\n".to_string())
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, report)
    }
}

#[cfg(test)]
#[path = "healthz_tests.rs"]
mod healthz_tests;
