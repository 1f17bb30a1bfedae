// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration smoke tests for the dnslb CRDs.
//!
//! These tests verify basic CRUD against a real cluster with the CRDs
//! installed. They skip silently when no cluster is reachable.
//!
//! Run with: cargo test --test simple_integration -- --ignored

use dnslb::crd::{
    DNSLoadBalancer, DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointSpec, DNSLoadBalancerSpec,
    DNSProvider, DNSProviderSpec, LoadBalancerType, ProviderScope, ScopeType,
};
use dnslb::labels::ANNOTATION_LOAD_BALANCER;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use kube::ResourceExt;
use std::collections::BTreeMap;

const TEST_NAMESPACE: &str = "dnslb-simple-test";

async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

async fn create_test_namespace(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = BTreeMap::new();
    labels.insert("test".to_string(), "integration".to_string());
    labels.insert("managed-by".to_string(), "dnslb-simple-test".to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(TEST_NAMESPACE.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn delete_test_namespace(client: &Client) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let _ = namespaces
        .delete(TEST_NAMESPACE, &DeleteParams::default())
        .await;
}

fn test_lb(name: &str) -> DNSLoadBalancer {
    DNSLoadBalancer::new(
        name,
        DNSLoadBalancerSpec {
            dns_name: format!("{name}.integration.example.com"),
            health_path: "/healthz".to_string(),
            status_code: Some(200),
            r#type: Some(LoadBalancerType::Balanced),
            singleton: None,
            ttl: Some(60),
            endpoint_validity_interval: Some("10m".to_string()),
        },
    )
}

#[tokio::test]
#[ignore = "requires a cluster with the dnslb CRDs installed"]
async fn test_loadbalancer_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    create_test_namespace(&client).await.expect("namespace");

    let api: Api<DNSLoadBalancer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let created = api
        .create(&PostParams::default(), &test_lb("crud-lb"))
        .await
        .expect("create DNSLoadBalancer");
    assert_eq!(created.spec.dns_name, "crud-lb.integration.example.com");

    let fetched = api.get("crud-lb").await.expect("get DNSLoadBalancer");
    assert_eq!(fetched.spec.r#type, Some(LoadBalancerType::Balanced));
    assert_eq!(fetched.validity_interval().map(|d| d.as_secs()), Some(600));

    api.delete("crud-lb", &DeleteParams::default())
        .await
        .expect("delete DNSLoadBalancer");
    delete_test_namespace(&client).await;
}

#[tokio::test]
#[ignore = "requires a cluster with the dnslb CRDs installed"]
async fn test_endpoint_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    create_test_namespace(&client).await.expect("namespace");

    let api: Api<DNSLoadBalancerEndpoint> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let ep = DNSLoadBalancerEndpoint::new(
        "crud-ep",
        DNSLoadBalancerEndpointSpec {
            load_balancer: "crud-lb".to_string(),
            ip_address: Some("192.0.2.10".to_string()),
            cname: None,
        },
    );
    let created = api
        .create(&PostParams::default(), &ep)
        .await
        .expect("create DNSLoadBalancerEndpoint");
    assert!(created.has_target());

    api.delete("crud-ep", &DeleteParams::default())
        .await
        .expect("delete DNSLoadBalancerEndpoint");
    delete_test_namespace(&client).await;
}

#[tokio::test]
#[ignore = "requires a cluster with the dnslb CRDs installed"]
async fn test_provider_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    create_test_namespace(&client).await.expect("namespace");

    let api: Api<DNSProvider> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let provider = DNSProvider::new(
        "crud-provider",
        DNSProviderSpec {
            r#type: "aws".to_string(),
            secret_ref: None,
            scope: Some(ProviderScope {
                r#type: Some(ScopeType::Cluster),
                namespaces: None,
            }),
        },
    );
    let created = api
        .create(&PostParams::default(), &provider)
        .await
        .expect("create DNSProvider");
    assert_eq!(created.spec.r#type, "aws");

    api.delete("crud-provider", &DeleteParams::default())
        .await
        .expect("delete DNSProvider");
    delete_test_namespace(&client).await;
}

#[tokio::test]
#[ignore = "requires a cluster with the dnslb CRDs installed"]
async fn test_annotated_service_round_trip() {
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    create_test_namespace(&client).await.expect("namespace");

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_LOAD_BALANCER.to_string(), "crud-lb".to_string());
    let service = Service {
        metadata: ObjectMeta {
            name: Some("crud-service".to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(vec![ServicePort {
                port: 443,
                ..Default::default()
            }]),
            selector: Some(BTreeMap::from([(
                "app".to_string(),
                "crud-test".to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };

    let api: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let created = api
        .create(&PostParams::default(), &service)
        .await
        .expect("create Service");
    assert_eq!(
        created
            .annotations()
            .get(ANNOTATION_LOAD_BALANCER)
            .map(String::as_str),
        Some("crud-lb")
    );

    api.delete("crud-service", &DeleteParams::default())
        .await
        .expect("delete Service");
    delete_test_namespace(&client).await;
}
