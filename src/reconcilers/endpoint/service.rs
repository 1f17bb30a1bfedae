// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service source type.
//!
//! A Service is a valid source when it is of type `LoadBalancer` and its
//! status carries at least one ingress address. Targets are read from
//! `status.loadBalancer.ingress[]`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{ObjectKey, WatchCache};
use crate::crd::DNSLoadBalancer;
use crate::reconcilers::events;
use crate::reconcilers::finalizers;
use crate::reconcilers::endpoint::sources::{Source, SourceError, SourceKind, SourceType};

/// Adapter for one cached Service.
pub struct ServiceSource {
    service: Arc<Service>,
}

impl ServiceSource {
    #[must_use]
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    fn has_load_balancer(&self) -> Result<bool, SourceError> {
        let service_type = self
            .service
            .spec
            .as_ref()
            .and_then(|spec| spec.type_.as_deref());
        if service_type != Some("LoadBalancer") {
            return Err(SourceError::Configuration(format!(
                "service {}/{} is not of type LoadBalancer",
                self.namespace(),
                self.name()
            )));
        }
        let assigned = self
            .service
            .status
            .as_ref()
            .and_then(|status| status.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|ingress| {
                ingress.iter().any(|entry| {
                    entry.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                        || entry.hostname.as_deref().is_some_and(|h| !h.is_empty())
                })
            });
        Ok(assigned)
    }
}

#[async_trait]
impl Source for ServiceSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Service
    }

    fn namespace(&self) -> String {
        self.service.namespace().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.service.name_any()
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        self.service.annotations().clone()
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        finalizers::has_finalizer(self.service.as_ref(), finalizer)
    }

    fn owner_ref(&self) -> Option<OwnerReference> {
        self.service.controller_owner_ref(&())
    }

    fn targets(&self, _lb: &DNSLoadBalancer) -> (Option<String>, Option<String>) {
        let mut ip = None;
        let mut cname = None;
        if let Some(ingress) = self
            .service
            .status
            .as_ref()
            .and_then(|status| status.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
        {
            for entry in ingress {
                if let Some(value) = entry.ip.as_deref().filter(|v| !v.is_empty()) {
                    ip = Some(value.to_string());
                }
                if let Some(value) = entry.hostname.as_deref().filter(|v| !v.is_empty()) {
                    cname = Some(value.to_string());
                }
            }
        }
        (ip, cname)
    }

    fn validate(&self, lb: &DNSLoadBalancer) -> Result<(), SourceError> {
        if !self.has_load_balancer()? {
            return Err(SourceError::Normal(format!(
                "load balancer not yet assigned for '{}/{}'",
                self.namespace(),
                self.name()
            )));
        }
        let (ip, cname) = self.targets(lb);
        if ip.is_none() && cname.is_none() {
            return Err(SourceError::Configuration(format!(
                "no host rule or loadbalancer status defined for '{}/{}'",
                self.namespace(),
                self.name()
            )));
        }
        Ok(())
    }

    async fn ensure_finalizer(&self, client: &Client, finalizer: &str) -> anyhow::Result<()> {
        finalizers::ensure_finalizer(client, self.service.as_ref(), finalizer).await
    }

    async fn remove_finalizer(&self, client: &Client, finalizer: &str) -> anyhow::Result<()> {
        finalizers::remove_finalizer(client, self.service.as_ref(), finalizer).await
    }

    async fn emit_event(&self, client: &Client, event_type: &str, reason: &str, message: &str) {
        events::emit_event(client, self.service.as_ref(), event_type, reason, message).await;
    }
}

/// Cache-backed [`SourceType`] for Services.
pub struct ServiceSourceType {
    cache: WatchCache<Service>,
}

impl ServiceSourceType {
    #[must_use]
    pub fn new(cache: WatchCache<Service>) -> Self {
        Self { cache }
    }
}

impl SourceType for ServiceSourceType {
    fn kind(&self) -> SourceKind {
        SourceKind::Service
    }

    fn get(&self, key: &ObjectKey) -> Option<Arc<dyn Source>> {
        let service = self.cache.get(key)?;
        Some(Arc::new(ServiceSource::new(service)))
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
