// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the Service source type.

#[cfg(test)]
mod tests {
    use crate::crd::{DNSLoadBalancer, DNSLoadBalancerSpec};
    use crate::reconcilers::endpoint::service::ServiceSource;
    use crate::reconcilers::endpoint::sources::{Source, SourceError};
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, Service, ServiceSpec, ServiceStatus,
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

    fn service(type_: &str, ingress: Vec<LoadBalancerIngress>) -> ServiceSource {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("app".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(ingress),
                }),
                ..Default::default()
            }),
        };
        ServiceSource::new(Arc::new(service))
    }

    fn ingress_entry(ip: Option<&str>, hostname: Option<&str>) -> LoadBalancerIngress {
        LoadBalancerIngress {
            ip: ip.map(ToString::to_string),
            hostname: hostname.map(ToString::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_wrong_type_is_configuration_error() {
        let source = service("ClusterIP", vec![]);
        match source.validate(&lb()) {
            Err(SourceError::Configuration(msg)) => {
                assert!(msg.contains("is not of type LoadBalancer"), "{msg}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_unassigned_lb_is_normal_error() {
        let source = service("LoadBalancer", vec![]);
        match source.validate(&lb()) {
            Err(SourceError::Normal(msg)) => {
                assert!(msg.contains("not yet assigned"), "{msg}");
            }
            other => panic!("expected normal error, got {other:?}"),
        }
    }

    #[test]
    fn test_ip_target() {
        let source = service("LoadBalancer", vec![ingress_entry(Some("10.0.0.5"), None)]);
        assert!(source.validate(&lb()).is_ok());
        assert_eq!(
            source.targets(&lb()),
            (Some("10.0.0.5".to_string()), None)
        );
    }

    #[test]
    fn test_hostname_target() {
        let source = service(
            "LoadBalancer",
            vec![ingress_entry(None, Some("lb-1234.elb.aws"))],
        );
        assert!(source.validate(&lb()).is_ok());
        assert_eq!(
            source.targets(&lb()),
            (None, Some("lb-1234.elb.aws".to_string()))
        );
    }

    #[test]
    fn test_last_entry_wins() {
        let source = service(
            "LoadBalancer",
            vec![
                ingress_entry(Some("10.0.0.5"), None),
                ingress_entry(Some("10.0.0.6"), Some("lb.elb.aws")),
            ],
        );
        assert_eq!(
            source.targets(&lb()),
            (Some("10.0.0.6".to_string()), Some("lb.elb.aws".to_string()))
        );
    }

    #[test]
    fn test_source_key() {
        let source = service("LoadBalancer", vec![]);
        let key = source.source_key();
        assert_eq!(key.label_value(), "Service:app/web");
    }
}
