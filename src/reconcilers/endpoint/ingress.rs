// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress source type.
//!
//! An Ingress is a valid source when the load balancer's DNS name appears
//! among its host rules. Targets come from `status.loadBalancer.ingress[]`,
//! falling back to the first rule host that differs from the load
//! balancer's own name.

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{ObjectKey, WatchCache};
use crate::crd::DNSLoadBalancer;
use crate::reconcilers::endpoint::sources::{Source, SourceError, SourceKind, SourceType};
use crate::reconcilers::events;
use crate::reconcilers::finalizers;

/// Adapter for one cached Ingress.
pub struct IngressSource {
    ingress: Arc<Ingress>,
}

impl IngressSource {
    #[must_use]
    pub fn new(ingress: Arc<Ingress>) -> Self {
        Self { ingress }
    }

    fn rule_hosts(&self) -> Vec<String> {
        self.ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.as_ref())
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|rule| rule.host.clone())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Source for IngressSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ingress
    }

    fn namespace(&self) -> String {
        self.ingress.namespace().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.ingress.name_any()
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        self.ingress.annotations().clone()
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        finalizers::has_finalizer(self.ingress.as_ref(), finalizer)
    }

    fn owner_ref(&self) -> Option<OwnerReference> {
        self.ingress.controller_owner_ref(&())
    }

    fn targets(&self, lb: &DNSLoadBalancer) -> (Option<String>, Option<String>) {
        let mut ip = None;
        let mut cname = None;
        if let Some(ingress) = self
            .ingress
            .status
            .as_ref()
            .and_then(|status| status.load_balancer.as_ref())
            .and_then(|load_balancer| load_balancer.ingress.as_ref())
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
        if ip.is_none() && cname.is_none() {
            for host in self.rule_hosts() {
                if host != lb.spec.dns_name {
                    cname = Some(host);
                    break;
                }
            }
        }
        (ip, cname)
    }

    fn validate(&self, lb: &DNSLoadBalancer) -> Result<(), SourceError> {
        let dns_configured = self
            .rule_hosts()
            .iter()
            .any(|host| *host == lb.spec.dns_name);
        if !dns_configured {
            return Err(SourceError::Configuration(format!(
                "load balancer host '{}' not configured as host rule for '{}/{}'",
                lb.spec.dns_name,
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
        finalizers::ensure_finalizer(client, self.ingress.as_ref(), finalizer).await
    }

    async fn remove_finalizer(&self, client: &Client, finalizer: &str) -> anyhow::Result<()> {
        finalizers::remove_finalizer(client, self.ingress.as_ref(), finalizer).await
    }

    async fn emit_event(&self, client: &Client, event_type: &str, reason: &str, message: &str) {
        events::emit_event(client, self.ingress.as_ref(), event_type, reason, message).await;
    }
}

/// Cache-backed [`SourceType`] for Ingresses.
pub struct IngressSourceType {
    cache: WatchCache<Ingress>,
}

impl IngressSourceType {
    #[must_use]
    pub fn new(cache: WatchCache<Ingress>) -> Self {
        Self { cache }
    }
}

impl SourceType for IngressSourceType {
    fn kind(&self) -> SourceKind {
        SourceKind::Ingress
    }

    fn get(&self, key: &ObjectKey) -> Option<Arc<dyn Source>> {
        let ingress = self.cache.get(key)?;
        Some(Arc::new(IngressSource::new(ingress)))
    }
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
