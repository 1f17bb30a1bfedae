// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Wiring in `main` builds the clients, spawns the watch caches and
//! assembles one [`Context`] that every reconciler receives as
//! `Arc<Context>`. The caches provide in-memory lookups; the registry and
//! seams (resolver, prober) are process-wide singletons.
//!
//! The source cluster holds the workload objects (Services, Ingresses);
//! the target cluster holds the dnslb CRDs and provider secrets. In
//! single-cluster deployments both clients point at the same cluster.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{ObjectKey, WatchCache};
use crate::cli::Options;
use crate::crd::{DNSLoadBalancer, DNSLoadBalancerEndpoint};
use crate::dns::lookup::HostResolver;
use crate::dns::provider::{ProviderRegistry, ProviderTypes};
use crate::labels::ANNOTATION_SOURCE;
use crate::reconcilers::endpoint::sources::{SourceKey, SourceTypes};
use crate::reconcilers::endpoint::SharedUsages;
use crate::reconcilers::lb::watch::HealthProbe;

/// Shared state passed to all controllers.
pub struct Context {
    /// Parsed command line options
    pub options: Options,

    /// Client for the source cluster (Services, Ingresses)
    pub source_client: Client,

    /// Client for the target cluster (CRDs, secrets)
    pub target_client: Client,

    /// Load balancer cache (target cluster)
    pub lbs: WatchCache<DNSLoadBalancer>,

    /// Endpoint cache (target cluster), sub-indexed by source annotation
    /// and load balancer
    pub endpoints: WatchCache<DNSLoadBalancerEndpoint>,

    /// Service cache (source cluster)
    pub services: WatchCache<Service>,

    /// Ingress cache (source cluster)
    pub ingresses: WatchCache<Ingress>,

    /// Kind-keyed source object lookup
    pub source_types: SourceTypes,

    /// Registered DNS providers
    pub registry: Arc<ProviderRegistry>,

    /// Provider type factories
    pub provider_types: Arc<ProviderTypes>,

    /// Host resolution seam
    pub resolver: Arc<dyn HostResolver>,

    /// HTTP health probe seam
    pub prober: Arc<dyn HealthProbe>,

    /// Annotation usage index: load balancer -> annotated sources
    pub usages: Arc<SharedUsages>,

    /// Process start, gating expired-endpoint cleanup
    pub started: Instant,
}

impl Context {
    /// Whether source and target objects live in the same cluster.
    #[must_use]
    pub fn same_cluster(&self) -> bool {
        self.options.targetkube.is_empty()
    }

    /// Identity of the source cluster, empty in single-cluster mode.
    #[must_use]
    pub fn cluster_id(&self) -> &str {
        &self.options.cluster
    }

    /// Endpoint children of one source object, across cluster-id prefixes.
    #[must_use]
    pub fn endpoints_for_source(&self, key: &SourceKey) -> Vec<Arc<DNSLoadBalancerEndpoint>> {
        self.endpoints
            .by_subkey(&format!("source:{}", key.label_value()))
    }

    /// Endpoint children of one load balancer.
    #[must_use]
    pub fn endpoints_for_lb(&self, lb: &ObjectKey) -> Vec<Arc<DNSLoadBalancerEndpoint>> {
        self.endpoints.by_subkey(&format!("lb:{lb}"))
    }
}

/// Secondary-index keys of an endpoint child: its source annotation and its
/// load balancer reference.
#[must_use]
pub fn endpoint_subkeys(ep: &DNSLoadBalancerEndpoint) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(source) = ep
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ANNOTATION_SOURCE))
    {
        keys.push(format!("source:{source}"));
    }
    let namespace = ep.metadata.namespace.clone().unwrap_or_default();
    keys.push(format!("lb:{namespace}/{}", ep.spec.load_balancer));
    keys
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
