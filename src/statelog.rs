// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! De-duplicated state logging.
//!
//! Health probes run every tick and mostly observe the same state they saw
//! last time. Logging (and emitting events for) every observation would
//! flood operators, so probe state lines go through a process-wide map of
//! `key -> last message`: a line is emitted only when the message for its
//! key actually changed.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use tracing::info;

static STATE: LazyLock<Mutex<HashMap<String, String>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Log `message` for `key` unless it is identical to the previous message
/// logged for the same key.
///
/// Returns `true` when the message was new and has been logged.
pub fn state_info(key: &str, message: &str) -> bool {
    let mut state = STATE.lock().expect("state log poisoned");
    if state.get(key).map(String::as_str) == Some(message) {
        return false;
    }
    state.insert(key.to_string(), message.to_string());
    info!(key, "{message}");
    true
}

/// Drop the recorded state for `key` so the next observation logs again.
pub fn forget(key: &str) {
    STATE.lock().expect("state log poisoned").remove(key);
}

#[cfg(test)]
#[path = "statelog_tests.rs"]
mod statelog_tests;
