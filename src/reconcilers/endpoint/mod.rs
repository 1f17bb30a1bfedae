// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint reconciler: one endpoint child per annotated source object.
//!
//! For every Service or Ingress carrying the load balancer annotation, this
//! controller maintains exactly one `DNSLoadBalancerEndpoint` in the target
//! cluster. The slave name is deterministic; historical slaves attributable
//! to the same source (e.g. after a cluster-id change) are found through
//! the source annotation and deleted, so renames stay idempotent.
//!
//! Cross-cluster ownership: when source and endpoint live in the same
//! cluster the endpoint carries an owner reference; otherwise the source
//! and cluster annotations replace it and this index does the tracking.

pub mod ingress;
pub mod service;
pub mod sources;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ObjectKey;
use crate::constants::{
    ENDPOINT_RESYNC_SECS, MISSING_LB_RETRY_SECS, VALIDITY_REFRESH_THRESHOLD_SECS,
};
use crate::context::Context;
use crate::crd::{
    DNSLoadBalancer, DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointSpec, STATE_PENDING,
};
use crate::dns_errors::classify_kube_error;
use crate::labels::{
    ANNOTATION_CLUSTER, ANNOTATION_LOAD_BALANCER, ANNOTATION_SOURCE, FINALIZER_SOURCE,
    LABEL_CONTROLLER, LABEL_CONTROLLER_VALUE,
};
use crate::reconcilers::events::TYPE_NORMAL;
use crate::reconcilers::modify::{update_ep_status, ModificationState};
use crate::reconcilers::{ReconcileStatus, Reconciler};

use sources::{Source, SourceError, SourceKey};

/// Annotation usage index: which sources currently reference which load
/// balancer. A load balancer change re-enqueues all its users.
#[derive(Default)]
pub struct SharedUsages {
    inner: RwLock<HashMap<ObjectKey, HashSet<SourceKey>>>,
}

impl SharedUsages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user` references `used`, dropping any previous
    /// reference of the same user.
    pub fn renew(&self, user: &SourceKey, used: &ObjectKey) {
        let mut inner = self.inner.write().expect("usage index poisoned");
        for (lb, users) in inner.iter_mut() {
            if lb != used {
                users.remove(user);
            }
        }
        inner.retain(|_, users| !users.is_empty());
        inner.entry(used.clone()).or_default().insert(user.clone());
    }

    /// Drop every reference of `user`.
    pub fn remove_user(&self, user: &SourceKey) {
        let mut inner = self.inner.write().expect("usage index poisoned");
        for users in inner.values_mut() {
            users.remove(user);
        }
        inner.retain(|_, users| !users.is_empty());
    }

    /// All sources currently referencing `used`.
    #[must_use]
    pub fn users_of(&self, used: &ObjectKey) -> Vec<SourceKey> {
        self.inner
            .read()
            .expect("usage index poisoned")
            .get(used)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Parse the load balancer annotation value `[<ns>/]<name>` relative to the
/// source namespace. More than one slash is invalid.
#[must_use]
pub fn parse_lb_ref(source_namespace: &str, value: &str) -> Option<ObjectKey> {
    let parts: Vec<&str> = value.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Some(ObjectKey::new(source_namespace, name)),
        [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
            Some(ObjectKey::new(namespace, name))
        }
        _ => None,
    }
}

/// Deterministic slave endpoint name for a source.
///
/// Cross-cluster deployments prefix the source cluster identity and
/// namespace so sources from different clusters cannot collide in the
/// target namespace.
#[must_use]
pub fn slave_name(cluster_id: &str, same_cluster: bool, key: &SourceKey) -> String {
    if same_cluster {
        format!("{}-{}", key.key.name, key.kind.lowercase())
    } else {
        format!(
            "{}-{}-{}-{}",
            cluster_id,
            key.key.namespace,
            key.key.name,
            key.kind.lowercase()
        )
    }
}

/// Next validity deadline for an endpoint.
///
/// Without a configured interval there is no deadline. An existing deadline
/// is kept while its residual lifetime exceeds the refresh threshold.
#[must_use]
pub fn update_deadline(
    interval: Option<Duration>,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let interval = interval?;
    if let Some(current) = current {
        if (current - now).num_seconds() > VALIDITY_REFRESH_THRESHOLD_SECS {
            return Some(current);
        }
    }
    Some(now + chrono::Duration::from_std(interval).unwrap_or_default())
}

/// The endpoint controller.
pub struct EndpointReconciler {
    ctx: Arc<Context>,
}

impl EndpointReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    fn ep_api(&self, namespace: &str) -> Api<DNSLoadBalancerEndpoint> {
        Api::namespaced(self.ctx.target_client.clone(), namespace)
    }

    fn new_endpoint(
        &self,
        source: &dyn Source,
        lb: &DNSLoadBalancer,
        key: &SourceKey,
    ) -> DNSLoadBalancerEndpoint {
        let (ip, cname) = source.targets(lb);
        let mut ep = DNSLoadBalancerEndpoint::new(
            &slave_name(self.ctx.cluster_id(), self.ctx.same_cluster(), key),
            DNSLoadBalancerEndpointSpec {
                load_balancer: lb.name_any(),
                ip_address: ip,
                cname,
            },
        );
        ep.metadata.namespace = lb.namespace();

        let labels = ep.metadata.labels.get_or_insert_with(Default::default);
        labels.insert(LABEL_CONTROLLER.to_string(), LABEL_CONTROLLER_VALUE.to_string());
        let annotations = ep.metadata.annotations.get_or_insert_with(Default::default);
        annotations.insert(ANNOTATION_SOURCE.to_string(), key.label_value());
        if self.ctx.same_cluster() {
            if let Some(owner) = source.owner_ref() {
                ep.metadata.owner_references = Some(vec![owner]);
            }
        } else {
            annotations.insert(
                ANNOTATION_CLUSTER.to_string(),
                self.ctx.cluster_id().to_string(),
            );
        }
        ep
    }

    async fn delete_endpoint(
        &self,
        source: Option<&dyn Source>,
        ep: &DNSLoadBalancerEndpoint,
    ) -> anyhow::Result<()> {
        let namespace = ep.namespace().unwrap_or_default();
        let name = ep.name_any();
        match self
            .ep_api(&namespace)
            .delete(&name, &DeleteParams::default())
            .await
        {
            Ok(_) => {}
            Err(err) => {
                let classified = classify_kube_error(&err);
                if !classified.is_not_found() {
                    anyhow::bail!(
                        "error deleting load balancer endpoint '{namespace}/{name}': {err}"
                    );
                }
            }
        }
        info!("dns load balancer endpoint {namespace}/{name} deleted");
        if let Some(source) = source {
            source
                .emit_event(
                    &self.ctx.source_client,
                    TYPE_NORMAL,
                    "sync",
                    &format!("dns load balancer endpoint {namespace}/{name} deleted"),
                )
                .await;
        }
        Ok(())
    }

    /// Delete every slave attributable to `key`, across historical
    /// cluster-id prefixes.
    async fn delete_slaves(
        &self,
        source: Option<&dyn Source>,
        key: &SourceKey,
    ) -> anyhow::Result<()> {
        let mut failed = false;
        for ep in self.ctx.endpoints_for_source(key) {
            if let Err(err) = self.delete_endpoint(source, &ep).await {
                warn!("{err}");
                failed = true;
            }
        }
        if failed {
            anyhow::bail!("some endpoint deletion failed");
        }
        Ok(())
    }

    async fn handle_cleanup(&self, source: Option<Arc<dyn Source>>, key: &SourceKey) -> ReconcileStatus {
        self.ctx.usages.remove_user(key);
        if let Err(err) = self.delete_slaves(source.as_deref(), key).await {
            return ReconcileStatus::delay(err.to_string());
        }
        if let Some(source) = source {
            if source.has_finalizer(FINALIZER_SOURCE) {
                if let Err(err) = source
                    .remove_finalizer(&self.ctx.source_client, FINALIZER_SOURCE)
                    .await
                {
                    return ReconcileStatus::delay(err.to_string());
                }
            }
        }
        ReconcileStatus::succeeded()
    }

    async fn create_endpoint(
        &self,
        source: &dyn Source,
        lb: &DNSLoadBalancer,
        desired: DNSLoadBalancerEndpoint,
    ) -> ReconcileStatus {
        let namespace = desired.namespace().unwrap_or_default();
        let api = self.ep_api(&namespace);
        let created = match api.create(&PostParams::default(), &desired).await {
            Ok(created) => created,
            Err(err) => {
                return ReconcileStatus::delay(format!(
                    "error creating load balancer endpoint: {err}"
                ));
            }
        };

        let deadline = update_deadline(lb.validity_interval(), None, Utc::now());
        if let Err(err) = update_ep_status(
            &api,
            &created,
            STATE_PENDING,
            None,
            Some(deadline.map(|t| t.to_rfc3339())),
        )
        .await
        {
            return ReconcileStatus::from_error(&err);
        }

        let name = created.name_any();
        info!("dns load balancer endpoint {namespace}/{name} created");
        source
            .emit_event(
                &self.ctx.source_client,
                TYPE_NORMAL,
                "sync",
                &format!("dns load balancer endpoint {namespace}/{name} created"),
            )
            .await;
        ReconcileStatus::succeeded_after(Duration::from_secs(ENDPOINT_RESYNC_SECS))
    }

    async fn update_endpoint(
        &self,
        source: &dyn Source,
        lb: &DNSLoadBalancer,
        current: &DNSLoadBalancerEndpoint,
        desired: &DNSLoadBalancerEndpoint,
        key: &SourceKey,
    ) -> ReconcileStatus {
        let namespace = current.namespace().unwrap_or_default();
        let api = self.ep_api(&namespace);

        let mut updated = current.clone();
        let mut state = ModificationState::new();
        state
            .assure_label(&mut updated, LABEL_CONTROLLER, Some(LABEL_CONTROLLER_VALUE))
            .assure_annotation(&mut updated, ANNOTATION_SOURCE, Some(&key.label_value()));
        if self.ctx.same_cluster() {
            state.assure_annotation(&mut updated, ANNOTATION_CLUSTER, None);
            if let Some(owner) = source.owner_ref() {
                let present = updated
                    .owner_references()
                    .iter()
                    .any(|existing| existing.uid == owner.uid);
                if !present {
                    updated
                        .metadata
                        .owner_references
                        .get_or_insert_with(Vec::new)
                        .push(owner);
                    state.modify(true);
                }
            }
        } else {
            state.assure_annotation(
                &mut updated,
                ANNOTATION_CLUSTER,
                Some(self.ctx.cluster_id()),
            );
        }

        let desired_ip = desired.spec.ip_address.clone();
        let desired_cname = desired.spec.cname.clone();
        state
            .assure_string_value(&mut updated.spec.load_balancer, &desired.spec.load_balancer);
        state.assure_string_ptr_value(&mut updated.spec.ip_address, desired_ip.as_deref());
        state.assure_string_ptr_value(&mut updated.spec.cname, desired_cname.as_deref());

        if state.modified() {
            info!("endpoint found, but requires update");
            if let Err(err) = api
                .replace(&updated.name_any(), &PostParams::default(), &updated)
                .await
            {
                let classified = classify_kube_error(&err);
                if classified.is_conflict() {
                    return ReconcileStatus::repeat(format!(
                        "conflict updating load balancer endpoint '{namespace}/{}': {err}",
                        updated.name_any()
                    ));
                }
                return ReconcileStatus::delay(format!(
                    "error updating load balancer endpoint '{namespace}/{}': {err}",
                    updated.name_any()
                ));
            }
            source
                .emit_event(
                    &self.ctx.source_client,
                    TYPE_NORMAL,
                    "sync",
                    &format!(
                        "dns load balancer endpoint {namespace}/{} updated",
                        updated.name_any()
                    ),
                )
                .await;
        } else {
            debug!("endpoint up to date");
        }

        // the validity deadline lives in status and refreshes independently
        let deadline = update_deadline(lb.validity_interval(), current.valid_until(), Utc::now());
        let current_deadline = current
            .status
            .as_ref()
            .and_then(|status| status.valid_until.clone());
        let desired_deadline = deadline.map(|t| t.to_rfc3339());
        if desired_deadline != current_deadline {
            let state_value = current
                .status
                .as_ref()
                .and_then(|status| status.state.clone())
                .unwrap_or_else(|| STATE_PENDING.to_string());
            if let Err(err) =
                update_ep_status(&api, current, &state_value, None, Some(desired_deadline)).await
            {
                return ReconcileStatus::from_error(&err);
            }
        }

        ReconcileStatus::succeeded_after(Duration::from_secs(ENDPOINT_RESYNC_SECS))
    }
}

#[async_trait]
impl Reconciler<SourceKey> for EndpointReconciler {
    async fn reconcile(&self, key: &SourceKey) -> ReconcileStatus {
        let Some(source) = self.ctx.source_types.get(key) else {
            // source object vanished; clean up its slaves
            debug!("source {key} gone, cleaning up");
            return self.handle_cleanup(None, key).await;
        };

        let annotations = source.annotations();
        let annotation = annotations.get(ANNOTATION_LOAD_BALANCER);
        let lb_ref = annotation.and_then(|value| parse_lb_ref(&source.namespace(), value));

        let Some(lb_ref) = lb_ref else {
            // annotation removed or unparsable
            return self.handle_cleanup(Some(source), key).await;
        };

        self.ctx.usages.renew(key, &lb_ref);
        debug!("reconcile {key} for {lb_ref}");

        let Some(lb) = self.ctx.lbs.get(&lb_ref) else {
            source
                .emit_event(
                    &self.ctx.source_client,
                    TYPE_NORMAL,
                    ANNOTATION_LOAD_BALANCER,
                    &format!("dns loadbalancer '{lb_ref}' does not exist"),
                )
                .await;
            return ReconcileStatus::failed_after(
                format!("dns loadbalancer '{lb_ref}' does not exist"),
                Duration::from_secs(MISSING_LB_RETRY_SECS),
            );
        };

        if let Err(err) = source.validate(&lb) {
            if let Err(delete_err) = self.delete_slaves(Some(source.as_ref()), key).await {
                warn!("{delete_err}");
            }
            return match err {
                SourceError::Normal(message) => ReconcileStatus::delay(message),
                SourceError::Configuration(message) => ReconcileStatus::failed(message),
            };
        }

        if let Err(err) = source
            .ensure_finalizer(&self.ctx.source_client, FINALIZER_SOURCE)
            .await
        {
            return ReconcileStatus::delay(err.to_string());
        }

        let desired = self.new_endpoint(source.as_ref(), &lb, key);
        let desired_name = desired.name_any();

        // exactly one slave: keep the one with the generated name, delete
        // every other historical slave of this source
        let mut current = None;
        for ep in self.ctx.endpoints_for_source(key) {
            if ep.name_any() == desired_name && current.is_none() {
                current = Some(ep);
            } else {
                warn!(
                    "found duplicate endpoint '{}/{}' for {key}",
                    ep.namespace().unwrap_or_default(),
                    ep.name_any()
                );
                if let Err(err) = self.delete_endpoint(Some(source.as_ref()), &ep).await {
                    return ReconcileStatus::delay(err.to_string());
                }
            }
        }

        match current {
            None => {
                info!("endpoint for loadbalancer {lb_ref} not found -> create it");
                self.create_endpoint(source.as_ref(), &lb, desired).await
            }
            Some(current) => {
                self.update_endpoint(source.as_ref(), &lb, &current, &desired, key)
                    .await
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
