// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the DNS reconciler tick plumbing.

#[cfg(test)]
mod tests {
    use crate::dns::testing::FakeResolver;
    use crate::reconcilers::lb::{DnsReconciler, DNS_TICK_KEY};
    use crate::reconcilers::testing::{test_context, FakeProber};
    use crate::reconcilers::{ReconcileStatus, Reconciler};
    use std::sync::Arc;
    use std::time::Duration;

    fn reconciler() -> DnsReconciler {
        let ctx = test_context(Arc::new(FakeProber::default()), FakeResolver::default());
        DnsReconciler::new(ctx)
    }

    #[tokio::test]
    async fn test_tick_reschedules() {
        let r = reconciler();
        let status = r.reconcile(&DNS_TICK_KEY.to_string()).await;
        match status {
            ReconcileStatus::Succeeded { reschedule } => {
                let delay = reschedule.expect("tick must reschedule itself");
                assert!(delay >= Duration::from_secs(1));
                assert!(delay <= Duration::from_secs(30));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_ignored() {
        let r = reconciler();
        let status = r.reconcile(&"not-the-tick".to_string()).await;
        assert_eq!(status, ReconcileStatus::succeeded());
    }

    #[tokio::test]
    async fn test_once_mode_does_not_reschedule() {
        let mut ctx = test_context(Arc::new(FakeProber::default()), FakeResolver::default());
        {
            let ctx_mut = Arc::get_mut(&mut ctx).expect("sole owner");
            ctx_mut.options.once = true;
        }
        let r = DnsReconciler::new(ctx);
        let status = r.reconcile(&DNS_TICK_KEY.to_string()).await;
        assert_eq!(status, ReconcileStatus::succeeded());
    }
}
