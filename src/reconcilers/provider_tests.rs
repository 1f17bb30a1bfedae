// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the provider reconciler.

#[cfg(test)]
mod tests {
    use crate::cache::{CacheBuilder, ObjectKey};
    use crate::crd::DNSProvider;
    use crate::dns::testing::{FakeProvider, FakeResolver};
    use crate::reconcilers::provider::ProviderReconciler;
    use crate::reconcilers::testing::{test_context, FakeProber};
    use crate::reconcilers::{ReconcileStatus, Reconciler};
    use kube::Api;
    use std::sync::Arc;
    use tokio::sync::watch;

    fn reconciler_with_context() -> (ProviderReconciler, Arc<crate::context::Context>) {
        let ctx = test_context(Arc::new(FakeProber::default()), FakeResolver::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        std::mem::forget(cancel_tx);
        let cache = CacheBuilder::<DNSProvider>::new(Api::all(
            crate::reconcilers::testing::mock_client(),
        ))
        .spawn(cancel_rx);
        (ProviderReconciler::new(ctx.clone(), cache), ctx)
    }

    #[tokio::test]
    async fn test_vanished_provider_without_registration() {
        let (reconciler, _ctx) = reconciler_with_context();
        let status = reconciler
            .reconcile(&ObjectKey::new("dns", "aws-main"))
            .await;
        assert_eq!(status, ReconcileStatus::succeeded());
    }

    #[tokio::test]
    async fn test_vanished_provider_unregisters_stale_registration() {
        let (reconciler, ctx) = reconciler_with_context();
        ctx.registry
            .register(
                "dns/aws-main",
                Arc::new(FakeProvider::new(&["example.com"])),
                None,
            )
            .unwrap();

        let status = reconciler
            .reconcile(&ObjectKey::new("dns", "aws-main"))
            .await;
        assert_eq!(status, ReconcileStatus::succeeded());
        assert!(
            ctx.registry.get("dns/aws-main").is_none(),
            "stale registration must be dropped when the resource is gone"
        );
    }
}
