// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{DNSLoadBalancer, DNSLoadBalancerSpec};
    use crate::labels::FINALIZER_SOURCE;
    use crate::reconcilers::finalizers::has_finalizer;

    fn lb_with_finalizers(finalizers: Option<Vec<&str>>) -> DNSLoadBalancer {
        let mut lb = DNSLoadBalancer::new(
            "mylb",
            DNSLoadBalancerSpec {
                dns_name: "svc.example.com".to_string(),
                health_path: String::new(),
                status_code: None,
                r#type: None,
                singleton: None,
                ttl: None,
                endpoint_validity_interval: None,
            },
        );
        lb.metadata.finalizers =
            finalizers.map(|f| f.into_iter().map(ToString::to_string).collect());
        lb
    }

    #[test]
    fn test_has_finalizer() {
        let lb = lb_with_finalizers(Some(vec![FINALIZER_SOURCE, "other/finalizer"]));
        assert!(has_finalizer(&lb, FINALIZER_SOURCE));
        assert!(has_finalizer(&lb, "other/finalizer"));
        assert!(!has_finalizer(&lb, "missing/finalizer"));
    }

    #[test]
    fn test_has_finalizer_none() {
        let lb = lb_with_finalizers(None);
        assert!(!has_finalizer(&lb, FINALIZER_SOURCE));

        let lb = lb_with_finalizers(Some(vec![]));
        assert!(!has_finalizer(&lb, FINALIZER_SOURCE));
    }
}
