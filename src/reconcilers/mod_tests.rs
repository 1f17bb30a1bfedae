// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the worker loop and status mapping.

#[cfg(test)]
mod tests {
    use crate::dns_errors::ControllerError;
    use crate::reconcilers::{run_worker, ReconcileStatus, Reconciler};
    use crate::scheduler::WorkQueue;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    struct CountingReconciler {
        calls: AtomicUsize,
        status: ReconcileStatus,
    }

    #[async_trait]
    impl Reconciler<String> for CountingReconciler {
        async fn reconcile(&self, _key: &String) -> ReconcileStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status.clone()
        }
    }

    #[test]
    fn test_status_from_error() {
        assert_eq!(
            ReconcileStatus::from_error(&ControllerError::Conflict("c".into())),
            ReconcileStatus::repeat("c")
        );
        assert_eq!(
            ReconcileStatus::from_error(&ControllerError::Transient("t".into())),
            ReconcileStatus::delay("t")
        );
        assert_eq!(
            ReconcileStatus::from_error(&ControllerError::NotFound("n".into())),
            ReconcileStatus::delay("n")
        );
        assert_eq!(
            ReconcileStatus::from_error(&ControllerError::Invalid("i".into())),
            ReconcileStatus::failed("i")
        );
    }

    #[tokio::test]
    async fn test_worker_processes_and_stops_on_shutdown() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        let reconciler = Arc::new(CountingReconciler {
            calls: AtomicUsize::new(0),
            status: ReconcileStatus::succeeded(),
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        queue.add("a".to_string());
        queue.add("b".to_string());

        let handle = tokio::spawn(run_worker(
            "test",
            0,
            queue.clone(),
            reconciler.clone(),
            cancel_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.shutdown();
        handle.await.unwrap();

        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_parks_failed_keys() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        let reconciler = Arc::new(CountingReconciler {
            calls: AtomicUsize::new(0),
            status: ReconcileStatus::failed("broken"),
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        queue.add("a".to_string());
        let handle = tokio::spawn(run_worker(
            "test",
            0,
            queue.clone(),
            reconciler.clone(),
            cancel_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_parked(&"a".to_string()), "failed key must be parked");
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);

        queue.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let queue: WorkQueue<String> = WorkQueue::new("test");
        let reconciler = Arc::new(CountingReconciler {
            calls: AtomicUsize::new(0),
            status: ReconcileStatus::succeeded(),
        });
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(run_worker(
            "test",
            0,
            queue.clone(),
            reconciler,
            cancel_rx,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
