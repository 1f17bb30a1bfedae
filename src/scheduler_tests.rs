// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `scheduler.rs`

#[cfg(test)]
mod tests {
    use crate::scheduler::WorkQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn test_add_and_get() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add("a".to_string());
        assert_eq!(queue.get().await, Some("a".to_string()));
        queue.done(&"a".to_string());
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add("a".to_string());
        queue.add("a".to_string());
        queue.add("b".to_string());
        assert_eq!(queue.len(), 2, "duplicate add must collapse");
    }

    #[tokio::test]
    async fn test_in_flight_key_requeued_on_done() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add("a".to_string());

        let key = queue.get().await.unwrap();
        // event arrives while the key is being processed
        queue.add("a".to_string());
        assert_eq!(queue.len(), 0, "in-flight key must not double-queue");

        queue.done(&key);
        assert_eq!(queue.len(), 1, "dirty key must be re-queued on done");
    }

    #[tokio::test]
    async fn test_wait_for_change_blocks_rate_limited() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.wait_for_change("a".to_string());
        assert!(queue.is_parked(&"a".to_string()));

        queue.add_rate_limited("a".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty(), "parked key must ignore rate-limited adds");

        queue.add_changed("a".to_string());
        assert!(!queue.is_parked(&"a".to_string()));
        assert_eq!(queue.get().await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_add_after_delays() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add_after("tick".to_string(), Duration::from_millis(50));
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_get() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        let getter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown();
        queue.shutdown(); // idempotent
        assert_eq!(getter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drain_before_shutdown_returns_pending_items() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add("a".to_string());
        queue.shutdown();
        assert_eq!(queue.get().await, Some("a".to_string()));
        queue.done(&"a".to_string());
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_forget_resets_backoff() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        queue.add_rate_limited("a".to_string());
        queue.forget(&"a".to_string());
        // nothing observable beyond not panicking; the delay task still fires
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
