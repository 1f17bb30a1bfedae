// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic DNS reconciler.
//!
//! A single logical tick, self-scheduled through the work queue under the
//! fixed key `dns`:
//!
//! 1. Build a [`watch::Watch`] per load balancer (plus watch-config file
//!    entries), resolving targets from the endpoint cache and garbage
//!    collecting expired endpoints.
//! 2. Probe every watch and apply the active target set to the DNS model.
//! 3. `model.update()` converges every provider, invoking per-watch
//!    feedback handlers.
//! 4. Complete outstanding feedback, then reschedule the next tick at
//!    `max(1, interval - elapsed)`.

pub mod config_file;
pub mod feedback;
pub mod watch;

use async_trait::async_trait;
use kube::{Api, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::ObjectKey;
use crate::constants::CLEANUP_GRACE_SECS;
use crate::context::Context;
use crate::crd::{DNSLoadBalancer, DNSLoadBalancerEndpoint};
use crate::dns::model::{DnsTarget, Model};
use crate::dns::set::DoneHandler;
use crate::metrics;
use crate::reconcilers::{ReconcileStatus, Reconciler};

use feedback::DnsDone;
use watch::{mark_lb_error, normalize_lb_type, resolve_singleton, Watch, WatchTarget};

/// Queue key of the periodic tick
pub const DNS_TICK_KEY: &str = "dns";

/// The DNS controller.
pub struct DnsReconciler {
    ctx: Arc<Context>,
    model: Mutex<Model>,
    once_signal: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl DnsReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        let model = Model::new(
            ctx.registry.clone(),
            ctx.resolver.clone(),
            &ctx.options.identity,
            ctx.options.ttl,
        );
        Self {
            ctx,
            model: Mutex::new(model),
            once_signal: std::sync::Mutex::new(None),
        }
    }

    /// Arm a completion signal fired after the single `--once` tick.
    #[must_use]
    pub fn with_once_signal(self, tx: tokio::sync::oneshot::Sender<()>) -> Self {
        *self.once_signal.lock().expect("once signal poisoned") = Some(tx);
        self
    }

    fn lb_api(&self, namespace: &str) -> Api<DNSLoadBalancer> {
        Api::namespaced(self.ctx.target_client.clone(), namespace)
    }

    fn ep_api(&self, namespace: &str) -> Api<DNSLoadBalancerEndpoint> {
        Api::namespaced(self.ctx.target_client.clone(), namespace)
    }

    /// Whether endpoint garbage collection is allowed yet. Suppressed for
    /// the first minutes after startup so a late source-cluster sync cannot
    /// race freshly rebuilt endpoints.
    fn cleanup_allowed(&self) -> bool {
        self.ctx.started.elapsed() >= Duration::from_secs(CLEANUP_GRACE_SECS)
    }

    async fn delete_expired_endpoint(&self, ep: &DNSLoadBalancerEndpoint, reason: &str) {
        let namespace = ep.namespace().unwrap_or_default();
        let name = ep.name_any();
        let api = self.ep_api(&namespace);
        // tick-driven, so transient API errors are retried here instead of
        // through a queue requeue
        let result = crate::reconcilers::retry::retry_api_call(
            || async { api.delete(&name, &kube::api::DeleteParams::default()).await },
            "delete expired endpoint",
        )
        .await;
        match result {
            Ok(_) => info!("outdated dns load balancer endpoint {namespace}/{name} deleted ({reason})"),
            Err(err) => warn!("cannot delete endpoint {namespace}/{name}: {err}"),
        }
    }

    /// Build the watch for one load balancer, or `None` when the load
    /// balancer is excluded from reconciliation.
    async fn build_watch(&self, lb: Arc<DNSLoadBalancer>) -> Option<Watch> {
        let namespace = lb.namespace().unwrap_or_default();
        let api = self.lb_api(&namespace);

        if lb.spec.dns_name.is_empty() {
            mark_lb_error(&api, &lb, "no dns name specified").await;
            return None;
        }

        let singleton = match resolve_singleton(&lb) {
            Ok((singleton, normalize)) => {
                if let Some(normalized) = normalize {
                    if let Err(err) = normalize_lb_type(&api, &lb, normalized).await {
                        warn!(
                            "cannot adapt lb type for {namespace}/{}: {err}",
                            lb.name_any()
                        );
                    }
                }
                singleton
            }
            Err(message) => {
                mark_lb_error(&api, &lb, &message).await;
                return None;
            }
        };

        let lb_key = ObjectKey::new(&namespace, &lb.name_any());
        let cleanup = self.cleanup_allowed();
        let mut targets = Vec::new();
        for ep in self.ctx.endpoints_for_lb(&lb_key) {
            if cleanup {
                if let Some(deadline) = ep.valid_until() {
                    if deadline < chrono::Utc::now() {
                        self.delete_expired_endpoint(&ep, "validity expired").await;
                        continue;
                    }
                }
            }
            let target = WatchTarget {
                ip_address: ep.spec.ip_address.clone(),
                cname: ep.spec.cname.clone(),
                endpoint: Some(ep.clone()),
            };
            if target.is_valid() {
                debug!(
                    "found {} target '{}' for '{lb_key}'",
                    target.record_type(),
                    target.host_name()
                );
                targets.push(target);
            } else {
                warn!("invalid target for '{lb_key}'");
            }
        }

        Some(Watch {
            dns_name: lb.spec.dns_name.clone(),
            health_path: lb.spec.health_path.clone(),
            status_code: lb.effective_status_code(),
            singleton,
            ttl: lb.spec.ttl,
            namespace: Some(namespace),
            lb: Some(lb),
            targets,
        })
    }

    /// Delete endpoints whose load balancer no longer exists.
    async fn cleanup_orphaned_endpoints(&self) {
        if !self.cleanup_allowed() {
            return;
        }
        for ep in self.ctx.endpoints.list() {
            let namespace = ep.namespace().unwrap_or_default();
            let lb_key = ObjectKey::new(&namespace, &ep.spec.load_balancer);
            if self.ctx.lbs.get(&lb_key).is_none() {
                self.delete_expired_endpoint(&ep, "load balancer gone").await;
            }
        }
    }

    async fn run_tick(&self) {
        let start = Instant::now();
        let interval = Duration::from_secs(self.ctx.options.interval.max(1));

        let mut watches: Vec<Watch> = Vec::new();
        if let Some(path) = &self.ctx.options.watches {
            match config_file::load_watch_config(path) {
                Ok(config) => {
                    watches.extend(config.watches.into_iter().map(config_file::WatchEntry::into_watch));
                }
                Err(err) => warn!("{err}"),
            }
        }
        for lb in self.ctx.lbs.list() {
            if let Some(watch) = self.build_watch(lb).await {
                watches.push(watch);
            }
        }

        let mut model = self.model.lock().await;
        model.reset();

        let mut seen_names: HashSet<String> = HashSet::new();
        let mut feedbacks: Vec<Arc<DnsDone>> = Vec::new();
        for watch in &watches {
            let done = Arc::new(DnsDone::new(
                self.ctx.target_client.clone(),
                watch.lb.clone(),
            ));
            feedbacks.push(done.clone());

            if !seen_names.insert(watch.dns_name.clone()) {
                done.invalid(&format!(
                    "dns name '{}' already in use by another load balancer",
                    watch.dns_name
                ))
                .await;
                continue;
            }

            let active = watch
                .probe(
                    self.ctx.prober.as_ref(),
                    self.ctx.resolver.as_ref(),
                    self.ctx.options.bogus_nxdomain_ip(),
                    &done,
                )
                .await;
            if active.is_empty() {
                // nothing applied: update() garbage collects the owned set
                continue;
            }

            let targets: Vec<DnsTarget> = active
                .iter()
                .map(|target| DnsTarget {
                    rtype: target.record_type(),
                    host: target.host_name().to_string(),
                })
                .collect();
            let handler: Arc<dyn DoneHandler> = done.clone();
            if let Err(err) = model
                .apply(
                    &watch.dns_name,
                    watch.namespace.as_deref(),
                    watch.ttl,
                    Some(handler),
                    &targets,
                )
                .await
            {
                warn!("cannot apply '{}': {err}", watch.dns_name);
            }
        }

        if let Err(err) = model.update().await {
            warn!("dns update failed: {err}");
        }
        drop(model);

        // watches whose provider had nothing to submit still get their
        // status written
        for done in feedbacks {
            done.succeeded().await;
        }

        self.cleanup_orphaned_endpoints().await;

        metrics::report_reconcile(interval, start.elapsed());
        debug!("dns tick finished in {:?}", start.elapsed());
    }

    /// Delay until the next tick: `max(1, interval - elapsed)`.
    fn next_tick(&self, elapsed: Duration) -> Duration {
        let interval = self.ctx.options.interval.max(1);
        let elapsed_secs = elapsed.as_secs();
        Duration::from_secs(interval.saturating_sub(elapsed_secs).max(1))
    }
}

#[async_trait]
impl Reconciler<String> for DnsReconciler {
    async fn reconcile(&self, key: &String) -> ReconcileStatus {
        if key != DNS_TICK_KEY {
            return ReconcileStatus::succeeded();
        }
        let start = Instant::now();
        self.run_tick().await;
        if self.ctx.options.once {
            info!("single reconciliation requested, not rescheduling");
            if let Some(tx) = self.once_signal.lock().expect("once signal poisoned").take() {
                let _ = tx.send(());
            }
            return ReconcileStatus::succeeded();
        }
        ReconcileStatus::succeeded_after(self.next_tick(start.elapsed()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
