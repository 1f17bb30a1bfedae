// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `statelog.rs`

#[cfg(test)]
mod tests {
    use crate::statelog::{forget, state_info};

    #[test]
    fn test_repeated_message_logged_once() {
        let key = "test-statelog-repeat";
        forget(key);

        assert!(state_info(key, "svc.example.com is healthy"));
        assert!(
            !state_info(key, "svc.example.com is healthy"),
            "identical message must be suppressed"
        );
        assert!(
            state_info(key, "svc.example.com is NOT healthy"),
            "changed message must be logged"
        );
        assert!(
            state_info(key, "svc.example.com is healthy"),
            "flapping back counts as a change"
        );
    }

    #[test]
    fn test_keys_are_independent() {
        forget("test-statelog-a");
        forget("test-statelog-b");

        assert!(state_info("test-statelog-a", "healthy"));
        assert!(
            state_info("test-statelog-b", "healthy"),
            "same message under another key is still new"
        );
    }

    #[test]
    fn test_forget_resets_state() {
        let key = "test-statelog-forget";
        forget(key);
        assert!(state_info(key, "healthy"));
        forget(key);
        assert!(state_info(key, "healthy"));
    }
}
