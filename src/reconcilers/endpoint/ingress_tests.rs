// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the Ingress source type.

#[cfg(test)]
mod tests {
    use crate::crd::{DNSLoadBalancer, DNSLoadBalancerSpec};
    use crate::reconcilers::endpoint::ingress::IngressSource;
    use crate::reconcilers::endpoint::sources::{Source, SourceError};
    use k8s_openapi::api::networking::v1::{
        Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
        IngressStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::Arc;

    fn lb() -> DNSLoadBalancer {
        DNSLoadBalancer::new(
            "mylb",
            DNSLoadBalancerSpec {
                dns_name: "svc.example.com".to_string(),
                health_path: "/healthz".to_string(),
                status_code: None,
                r#type: None,
                singleton: None,
                ttl: None,
                endpoint_validity_interval: None,
            },
        )
    }

    fn ingress(hosts: &[&str], status_entries: Vec<IngressLoadBalancerIngress>) -> IngressSource {
        let rules = hosts
            .iter()
            .map(|host| IngressRule {
                host: Some((*host).to_string()),
                ..Default::default()
            })
            .collect();
        let ingress = Ingress {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("app".to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(rules),
                ..Default::default()
            }),
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(status_entries),
                }),
            }),
        };
        IngressSource::new(Arc::new(ingress))
    }

    #[test]
    fn test_dns_name_must_appear_in_rules() {
        let source = ingress(&["other.example.com"], vec![]);
        match source.validate(&lb()) {
            Err(SourceError::Configuration(msg)) => {
                assert!(msg.contains("not configured as host rule"), "{msg}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_target_preferred() {
        let source = ingress(
            &["svc.example.com", "fallback.example.com"],
            vec![IngressLoadBalancerIngress {
                ip: Some("10.0.0.5".to_string()),
                ..Default::default()
            }],
        );
        assert!(source.validate(&lb()).is_ok());
        assert_eq!(source.targets(&lb()), (Some("10.0.0.5".to_string()), None));
    }

    #[test]
    fn test_rule_host_fallback() {
        let source = ingress(&["svc.example.com", "fallback.example.com"], vec![]);
        assert!(source.validate(&lb()).is_ok());
        assert_eq!(
            source.targets(&lb()),
            (None, Some("fallback.example.com".to_string())),
            "first rule host differing from the LB name becomes the target"
        );
    }

    #[test]
    fn test_no_target_is_configuration_error() {
        let source = ingress(&["svc.example.com"], vec![]);
        match source.validate(&lb()) {
            Err(SourceError::Configuration(msg)) => {
                assert!(msg.contains("no host rule or loadbalancer status"), "{msg}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }
}
