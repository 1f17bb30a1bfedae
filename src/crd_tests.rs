// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        DNSLoadBalancer, DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointSpec,
        DNSLoadBalancerEndpointStatus, DNSLoadBalancerSpec, DNSProvider, LoadBalancerType,
        ProviderScope, ScopeType,
    };
    use kube::Resource;
    use std::time::Duration;

    fn lb(spec: DNSLoadBalancerSpec) -> DNSLoadBalancer {
        DNSLoadBalancer::new("mylb", spec)
    }

    #[test]
    fn test_api_resource_names() {
        assert_eq!(DNSLoadBalancer::kind(&()), "DNSLoadBalancer");
        assert_eq!(DNSLoadBalancer::group(&()), "dnslb.firestoned.io");
        assert_eq!(DNSLoadBalancer::version(&()), "v1beta1");
        assert_eq!(DNSLoadBalancerEndpoint::kind(&()), "DNSLoadBalancerEndpoint");
        assert_eq!(DNSProvider::kind(&()), "DNSProvider");
    }

    #[test]
    fn test_lb_spec_serializes_camel_case() {
        let spec = DNSLoadBalancerSpec {
            dns_name: "svc.example.com".to_string(),
            health_path: "/healthz".to_string(),
            status_code: Some(204),
            r#type: Some(LoadBalancerType::Balanced),
            singleton: None,
            ttl: Some(60),
            endpoint_validity_interval: Some("10m".to_string()),
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["dnsName"], "svc.example.com");
        assert_eq!(json["healthPath"], "/healthz");
        assert_eq!(json["statusCode"], 204);
        assert_eq!(json["type"], "Balanced");
        assert_eq!(json["endpointValidityInterval"], "10m");
        // absent optional fields must not appear
        assert!(json.get("singleton").is_none());
    }

    #[test]
    fn test_status_code_defaulting() {
        let mut l = lb(DNSLoadBalancerSpec {
            dns_name: "svc.example.com".to_string(),
            health_path: String::new(),
            status_code: None,
            r#type: None,
            singleton: None,
            ttl: None,
            endpoint_validity_interval: None,
        });
        assert_eq!(l.effective_status_code(), 200);

        l.spec.status_code = Some(0);
        assert_eq!(l.effective_status_code(), 200, "zero counts as unset");

        l.spec.status_code = Some(503);
        assert_eq!(l.effective_status_code(), 503);
    }

    #[test]
    fn test_validity_interval_parsing() {
        let mut l = lb(DNSLoadBalancerSpec {
            dns_name: "svc.example.com".to_string(),
            health_path: String::new(),
            status_code: None,
            r#type: None,
            singleton: None,
            ttl: None,
            endpoint_validity_interval: Some("10m".to_string()),
        });
        assert_eq!(l.validity_interval(), Some(Duration::from_secs(600)));

        l.spec.endpoint_validity_interval = Some("0s".to_string());
        assert_eq!(l.validity_interval(), None, "zero duration means unset");

        l.spec.endpoint_validity_interval = Some("not-a-duration".to_string());
        assert_eq!(l.validity_interval(), None);

        l.spec.endpoint_validity_interval = None;
        assert_eq!(l.validity_interval(), None);
    }

    #[test]
    fn test_endpoint_has_target() {
        let mut ep = DNSLoadBalancerEndpoint::new(
            "web-service",
            DNSLoadBalancerEndpointSpec {
                load_balancer: "mylb".to_string(),
                ip_address: None,
                cname: None,
            },
        );
        assert!(!ep.has_target());

        ep.spec.ip_address = Some(String::new());
        assert!(!ep.has_target(), "empty string counts as unset");

        ep.spec.ip_address = Some("10.0.0.5".to_string());
        assert!(ep.has_target());

        ep.spec.ip_address = None;
        ep.spec.cname = Some("lb-1234.elb.aws".to_string());
        assert!(ep.has_target());
    }

    #[test]
    fn test_endpoint_valid_until_parsing() {
        let mut ep = DNSLoadBalancerEndpoint::new(
            "web-service",
            DNSLoadBalancerEndpointSpec {
                load_balancer: "mylb".to_string(),
                ip_address: Some("10.0.0.5".to_string()),
                cname: None,
            },
        );
        assert_eq!(ep.valid_until(), None);

        ep.status = Some(DNSLoadBalancerEndpointStatus {
            state: None,
            healthy: None,
            valid_until: Some("2025-06-01T12:00:00Z".to_string()),
        });
        let t = ep.valid_until().expect("parses");
        assert_eq!(t.to_rfc3339(), "2025-06-01T12:00:00+00:00");

        ep.status.as_mut().unwrap().valid_until = Some("garbage".to_string());
        assert_eq!(ep.valid_until(), None);
    }

    #[test]
    fn test_scope_round_trip() {
        let scope = ProviderScope {
            r#type: Some(ScopeType::Selected),
            namespaces: Some(vec!["app".to_string(), "web".to_string()]),
        };
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["type"], "Selected");
        let back: ProviderScope = serde_json::from_value(json).unwrap();
        assert_eq!(back, scope);
    }

    #[test]
    fn test_lb_type_parsing() {
        let ty: LoadBalancerType = serde_json::from_value(serde_json::json!("Exclusive")).unwrap();
        assert!(ty.is_exclusive());
        let ty: LoadBalancerType = serde_json::from_value(serde_json::json!("Balanced")).unwrap();
        assert!(!ty.is_exclusive());
        assert!(serde_json::from_value::<LoadBalancerType>(serde_json::json!("Weighted")).is_err());
    }
}
