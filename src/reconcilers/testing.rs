// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for reconciler tests: a mock API client answering 404 to
//! everything, a configurable fake prober, and a ready-made [`Context`].

use async_trait::async_trait;
use kube::{Api, Client};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;

use crate::cache::CacheBuilder;
use crate::cli::Options;
use crate::context::{endpoint_subkeys, Context};
use crate::dns::provider::{ProviderRegistry, ProviderTypes};
use crate::dns::testing::FakeResolver;
use crate::reconcilers::endpoint::ingress::IngressSourceType;
use crate::reconcilers::endpoint::service::ServiceSourceType;
use crate::reconcilers::endpoint::sources::SourceTypes;
use crate::reconcilers::endpoint::SharedUsages;
use crate::reconcilers::lb::watch::HealthProbe;

/// Client whose every request answers 404.
pub fn mock_client() -> Client {
    let service = tower::service_fn(|_req: http::Request<kube::client::Body>| async {
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "not found",
            "reason": "NotFound",
            "code": 404,
        })
        .to_string();
        let response = http::Response::builder()
            .status(404)
            .header("content-type", "application/json")
            .body(kube::client::Body::from(body.into_bytes()))
            .expect("response");
        Ok::<_, std::convert::Infallible>(response)
    });
    Client::new(service, "default")
}

/// Prober with a fixed set of healthy hosts.
#[derive(Default)]
pub struct FakeProber {
    healthy: Mutex<HashSet<String>>,
}

impl FakeProber {
    pub fn with(self, host: &str) -> Self {
        self.healthy.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn set_healthy(&self, host: &str, healthy: bool) {
        let mut set = self.healthy.lock().unwrap();
        if healthy {
            set.insert(host.to_string());
        } else {
            set.remove(host);
        }
    }
}

#[async_trait]
impl HealthProbe for FakeProber {
    async fn is_healthy(
        &self,
        host: &str,
        _path: &str,
        _host_header: Option<&str>,
        _expected_status: i32,
    ) -> bool {
        self.healthy.lock().unwrap().contains(host)
    }
}

/// A context wired against the mock client, with empty caches.
pub fn test_context(prober: Arc<dyn HealthProbe>, resolver: FakeResolver) -> Arc<Context> {
    let client = mock_client();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    // keep the cancel sender alive for the lifetime of the test process
    std::mem::forget(_cancel_tx);

    let lbs = CacheBuilder::new(Api::all(client.clone())).spawn(cancel_rx.clone());
    let endpoints = CacheBuilder::new(Api::all(client.clone()))
        .subkey(endpoint_subkeys)
        .spawn(cancel_rx.clone());
    let services = CacheBuilder::new(Api::all(client.clone())).spawn(cancel_rx.clone());
    let ingresses = CacheBuilder::new(Api::all(client.clone())).spawn(cancel_rx.clone());

    let source_types = SourceTypes::new()
        .with(Arc::new(ServiceSourceType::new(services.clone())))
        .with(Arc::new(IngressSourceType::new(ingresses.clone())));

    Arc::new(Context {
        options: <Options as clap::Parser>::parse_from(["dnslb-controller"]),
        source_client: client.clone(),
        target_client: client,
        lbs,
        endpoints,
        services,
        ingresses,
        source_types,
        registry: Arc::new(ProviderRegistry::new()),
        provider_types: Arc::new(ProviderTypes::new()),
        resolver: Arc::new(resolver),
        prober,
        usages: Arc::new(SharedUsages::new()),
        started: Instant::now(),
    })
}
