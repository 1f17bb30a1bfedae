// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-load-balancer health probing and active-set selection.
//!
//! A [`Watch`] bundles everything one tick needs for one DNS name: probe
//! parameters, the resolved target list and the owning load balancer. The
//! probe flow:
//!
//! 1. Resolve the DNS name. An empty answer, or an answer equal to the
//!    configured bogus-NXDOMAIN sentinel, means "not yet resolvable"; the
//!    name-level HTTP probe is skipped.
//! 2. Probe `https://<dnsName><healthPath>` (TLS verification disabled).
//! 3. Probe every target under its own address with a `Host` header
//!    override, classifying targets healthy/unhealthy.
//! 4. Select the active set: Exclusive keeps the currently active target
//!    while it stays healthy, otherwise picks the first healthy one in
//!    stable order; Balanced activates every healthy target.
//!
//! Probe state lines are de-duplicated per key through the state log.

use async_trait::async_trait;
use reqwest::header::HOST;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{DEFAULT_STATUS_CODE, PROBE_TIMEOUT_SECS};
use crate::crd::{
    DNSLoadBalancer, DNSLoadBalancerEndpoint, LoadBalancerType, STATE_ERROR,
};
use crate::dns::lookup::HostResolver;
use crate::dns::set::RecordType;
use crate::metrics;
use crate::reconcilers::lb::feedback::DnsDone;
use crate::statelog;
use kube::ResourceExt;
use tracing::debug;

/// HTTP health probing seam.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// GET `https://<host><path>`, optionally overriding the `Host` header,
    /// and compare the response status against `expected_status`.
    async fn is_healthy(
        &self,
        host: &str,
        path: &str,
        host_header: Option<&str>,
        expected_status: i32,
    ) -> bool;
}

/// Probe implementation over `reqwest` with TLS verification disabled.
/// Probes are reachability checks, not trust decisions.
pub struct ReqwestProber {
    client: reqwest::Client,
}

impl ReqwestProber {
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for ReqwestProber {
    async fn is_healthy(
        &self,
        host: &str,
        path: &str,
        host_header: Option<&str>,
        expected_status: i32,
    ) -> bool {
        let url = format!("https://{host}{path}");
        let mut request = self.client.get(&url);
        if let Some(header) = host_header {
            request = request.header(HOST, header);
        }
        debug!("health check for {host:?}({:?}){path}", host_header.unwrap_or(host));
        match request.send().await {
            Ok(response) => i32::from(response.status().as_u16()) == expected_status,
            Err(_) => false,
        }
    }
}

/// One candidate target of a watch.
#[derive(Clone, Debug)]
pub struct WatchTarget {
    pub ip_address: Option<String>,
    pub cname: Option<String>,
    pub endpoint: Option<Arc<DNSLoadBalancerEndpoint>>,
}

impl WatchTarget {
    /// Hostname published for this target: the CNAME when set, else the IP.
    #[must_use]
    pub fn host_name(&self) -> &str {
        match self.cname.as_deref().filter(|c| !c.is_empty()) {
            Some(cname) => cname,
            None => self.ip_address.as_deref().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn record_type(&self) -> RecordType {
        if self.cname.as_deref().is_some_and(|c| !c.is_empty()) {
            RecordType::Cname
        } else {
            RecordType::A
        }
    }

    /// Stable identity for metrics and ordering: the endpoint key when the
    /// target is backed by one, else the hostname.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.endpoint {
            Some(ep) => format!(
                "{}/{}",
                ep.namespace().unwrap_or_default(),
                ep.name_any()
            ),
            None => self.host_name().to_string(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.host_name().is_empty()
    }
}

/// Resolved singleton mode of a load balancer.
///
/// Returns `(singleton, normalize)`: `normalize` carries the type to write
/// back when the legacy `singleton` field filled in an absent `type` (the
/// rewrite clears `singleton` in the same update).
///
/// # Errors
///
/// `singleton` and `type` both set is a terminal configuration error.
pub fn resolve_singleton(
    lb: &DNSLoadBalancer,
) -> Result<(bool, Option<LoadBalancerType>), String> {
    let mut singleton = false;
    if let Some(legacy) = lb.spec.singleton {
        if lb.spec.r#type.is_some() {
            return Err("invalid load balancer type: singleton and type specified".to_string());
        }
        singleton = legacy;
    }
    match lb.spec.r#type {
        Some(LoadBalancerType::Exclusive) => Ok((true, None)),
        Some(LoadBalancerType::Balanced) => Ok((false, None)),
        None => {
            let normalized = if singleton {
                LoadBalancerType::Exclusive
            } else {
                LoadBalancerType::Balanced
            };
            Ok((singleton, Some(normalized)))
        }
    }
}

/// Everything one tick needs for one DNS name.
pub struct Watch {
    pub dns_name: String,
    pub health_path: String,
    pub status_code: i32,
    pub singleton: bool,
    pub ttl: Option<i64>,
    /// Namespace used for provider scope checks; `None` for watch-config
    /// file entries
    pub namespace: Option<String>,
    pub lb: Option<Arc<DNSLoadBalancer>>,
    pub targets: Vec<WatchTarget>,
}

impl Watch {
    /// Log/metrics key of this watch.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.lb {
            Some(lb) => format!("{}/{}", lb.namespace().unwrap_or_default(), lb.name_any()),
            None => self.dns_name.clone(),
        }
    }

    fn effective_status_code(&self) -> i32 {
        if self.status_code == 0 {
            DEFAULT_STATUS_CODE
        } else {
            self.status_code
        }
    }

    /// Endpoint names currently listed active in the load balancer status.
    fn currently_active(&self) -> Vec<String> {
        self.lb
            .as_ref()
            .and_then(|lb| lb.status.as_ref())
            .and_then(|status| status.active.as_ref())
            .map(|active| active.iter().map(|a| a.endpoint.clone()).collect())
            .unwrap_or_default()
    }

    fn is_currently_active(&self, target: &WatchTarget) -> bool {
        let Some(ep) = &target.endpoint else {
            return false;
        };
        self.currently_active()
            .iter()
            .any(|name| *name == ep.name_any())
    }

    /// Probe the name and all targets and feed the outcome into `done`.
    /// Returns the active target set.
    pub async fn probe(
        &self,
        prober: &dyn HealthProbe,
        resolver: &dyn HostResolver,
        nxdomain: Option<IpAddr>,
        done: &DnsDone,
    ) -> Vec<WatchTarget> {
        let key = self.key();
        let code = self.effective_status_code();

        if self.targets.is_empty() {
            statelog::state_info(&self.dns_name, &format!("no endpoints configured for {key}"));
            done.error(true, "no endpoints configured").await;
            return Vec::new();
        }

        // name-level probe, gated by resolvability
        let resolved = match resolver.lookup_ips(&self.dns_name).await {
            Ok(ips) if !ips.is_empty() => match nxdomain {
                Some(sentinel) => ips[0] != sentinel,
                None => true,
            },
            _ => false,
        };
        if resolved {
            if prober.is_healthy(&self.dns_name, &self.health_path, None, code).await {
                done.set_healthy(true);
                statelog::state_info(&self.dns_name, &format!("{key} is healthy"));
                metrics::report_lb(&key, &self.dns_name, true);
            } else {
                done.set_healthy(false);
                statelog::state_info(&self.dns_name, &format!("{key} is NOT healthy"));
                metrics::report_lb(&key, &self.dns_name, false);
            }
        } else {
            done.set_healthy(false);
            statelog::state_info(&self.dns_name, &format!("{key} not yet resolvable"));
            metrics::report_lb(&key, &self.dns_name, false);
        }

        // deterministic iteration order keeps exclusive selection stable
        let mut targets = self.targets.clone();
        targets.sort_by_key(WatchTarget::key);

        let mut active = Vec::new();
        if self.singleton {
            let mut selected: Option<WatchTarget> = None;
            for target in &targets {
                let host = target.host_name().to_string();
                let currently_active = self.is_currently_active(target);
                if prober
                    .is_healthy(&host, &self.health_path, Some(&self.dns_name), code)
                    .await
                {
                    metrics::report_endpoint(&key, &target.key(), &host, true);
                    done.add_healthy_target(target);
                    if selected.is_none() {
                        selected = Some(target.clone());
                    }
                    if currently_active {
                        selected = Some(target.clone());
                        statelog::state_info(
                            &host,
                            &format!("healthy active target for {} is {host}", self.dns_name),
                        );
                    } else {
                        statelog::state_info(&host, &format!("target {host} is healthy"));
                    }
                } else {
                    metrics::report_endpoint(&key, &target.key(), &host, false);
                    done.add_unhealthy_target(target);
                    if currently_active {
                        statelog::state_info(&host, &format!("active target {host} is unhealthy"));
                    } else {
                        statelog::state_info(&host, &format!("target {host} is unhealthy"));
                    }
                }
            }
            if let Some(selected) = selected {
                done.add_active_target(&selected);
                active.push(selected);
            }
        } else {
            for target in &targets {
                let host = target.host_name().to_string();
                if prober
                    .is_healthy(&host, &self.health_path, Some(&self.dns_name), code)
                    .await
                {
                    metrics::report_endpoint(&key, &target.key(), &host, true);
                    statelog::state_info(&host, &format!("target {host} is healthy"));
                    done.add_healthy_target(target);
                    done.add_active_target(target);
                    active.push(target.clone());
                } else {
                    metrics::report_endpoint(&key, &target.key(), &host, false);
                    statelog::state_info(&host, &format!("target {host} is unhealthy"));
                    done.add_unhealthy_target(target);
                }
            }
        }

        if active.is_empty() {
            done.set_message("no healthy targets found");
        }
        active
    }
}

/// Write back the normalized type of a legacy-singleton load balancer or
/// mark it erroneous, as one atomic update each.
pub async fn normalize_lb_type(
    api: &kube::Api<DNSLoadBalancer>,
    lb: &DNSLoadBalancer,
    normalized: LoadBalancerType,
) -> anyhow::Result<()> {
    use kube::api::{Patch, PatchParams};
    let patch = serde_json::json!({
        "spec": { "type": normalized, "singleton": null }
    });
    tracing::info!(
        "adapt lb type for {}/{}",
        lb.namespace().unwrap_or_default(),
        lb.name_any()
    );
    api.patch(&lb.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Mark a load balancer with conflicting singleton/type settings.
pub async fn mark_lb_error(
    api: &kube::Api<DNSLoadBalancer>,
    lb: &DNSLoadBalancer,
    message: &str,
) {
    use crate::reconcilers::modify::{update_lb_status, ActiveUpdate};
    if let Err(err) = update_lb_status(api, lb, STATE_ERROR, Some(message), ActiveUpdate::Keep).await
    {
        tracing::warn!(
            "cannot update status of {}/{}: {err}",
            lb.namespace().unwrap_or_default(),
            lb.name_any()
        );
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
