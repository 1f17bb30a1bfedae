// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `feedback.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointSpec};
    use crate::dns::set::DoneHandler;
    use crate::reconcilers::lb::feedback::DnsDone;
    use crate::reconcilers::lb::watch::WatchTarget;
    use crate::reconcilers::testing::mock_client;
    use std::sync::Arc;

    fn target(name: &str, ip: &str) -> WatchTarget {
        let mut ep = DNSLoadBalancerEndpoint::new(
            name,
            DNSLoadBalancerEndpointSpec {
                load_balancer: "mylb".to_string(),
                ip_address: Some(ip.to_string()),
                cname: None,
            },
        );
        ep.metadata.namespace = Some("app".to_string());
        WatchTarget {
            ip_address: Some(ip.to_string()),
            cname: None,
            endpoint: Some(Arc::new(ep)),
        }
    }

    #[tokio::test]
    async fn test_outcome_processed_once() {
        let done = DnsDone::new(mock_client(), None);
        assert!(!done.is_done());

        done.succeeded().await;
        assert!(done.is_done());

        // a later failure must not override the first outcome
        done.failed("late failure").await;
        assert!(done.is_done());
    }

    #[tokio::test]
    async fn test_error_without_lb_completes() {
        let done = DnsDone::new(mock_client(), None);
        done.error(true, "no endpoints configured").await;
        assert!(done.is_done());
    }

    #[tokio::test]
    async fn test_target_accounting() {
        let done = DnsDone::new(mock_client(), None);
        assert!(!done.has_healthy());

        done.add_healthy_target(&target("ep-a", "10.0.0.5"));
        done.add_active_target(&target("ep-a", "10.0.0.5"));
        done.add_unhealthy_target(&target("ep-b", "10.0.0.6"));
        assert!(done.has_healthy());
    }

    #[tokio::test]
    async fn test_healthy_flag() {
        let done = DnsDone::new(mock_client(), None);
        assert!(!done.snapshot_healthy());
        done.set_healthy(true);
        assert!(done.snapshot_healthy());
        done.set_healthy(false);
        assert!(!done.snapshot_healthy());
    }

    #[tokio::test]
    async fn test_invalid_completes() {
        let done = DnsDone::new(mock_client(), None);
        done.invalid("no provider found").await;
        assert!(done.is_done());

        done.succeeded().await; // no-op
        assert!(done.is_done());
    }

    #[tokio::test]
    async fn test_pending_completes() {
        let done = DnsDone::new(mock_client(), None);
        done.pending("waiting for provider").await;
        assert!(done.is_done());
    }
}
