// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Accumulated modification tracking and status update helpers.
//!
//! [`ModificationState`] collects field comparisons so a reconciler issues a
//! single update only when something actually changed. Pointer-to-nil and
//! empty values compare equal, matching the wire behavior of optional string
//! fields.
//!
//! The status helpers write `.status` through the status subresource and
//! surface optimistic-concurrency conflicts as
//! [`ControllerError::Conflict`] so callers can requeue with the repeat
//! disposition.

use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Resource, ResourceExt};
use kube::core::object::HasStatus;
use serde_json::json;
use tracing::info;

use crate::crd::{
    DNSLoadBalancer, DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointStatus, DNSLoadBalancerStatus,
    DNSProvider, DNSProviderStatus, LoadBalancerActive,
};
use crate::dns_errors::{classify_kube_error, ControllerError};

/// Accumulates field comparisons and remembers whether anything changed.
#[derive(Debug, Default)]
pub struct ModificationState {
    modified: bool,
}

impl ModificationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an externally detected modification.
    pub fn modify(&mut self, modified: bool) -> &mut Self {
        self.modified |= modified;
        self
    }

    /// Assure an optional string field has `value`; `None` and `""` are
    /// equivalent.
    pub fn assure_string_ptr_value(
        &mut self,
        field: &mut Option<String>,
        value: Option<&str>,
    ) -> &mut Self {
        let current = field.as_deref().unwrap_or_default();
        let desired = value.unwrap_or_default();
        if current != desired {
            *field = if desired.is_empty() {
                None
            } else {
                Some(desired.to_string())
            };
            self.modified = true;
        }
        self
    }

    /// Assure a required string field has `value`.
    pub fn assure_string_value(&mut self, field: &mut String, value: &str) -> &mut Self {
        if field != value {
            *field = value.to_string();
            self.modified = true;
        }
        self
    }

    /// Assure an optional bool field has `value`; `None` and `false` are
    /// equivalent.
    pub fn assure_bool_value(&mut self, field: &mut Option<bool>, value: bool) -> &mut Self {
        let current = field.unwrap_or_default();
        if current != value {
            *field = Some(value);
            self.modified = true;
        }
        self
    }

    /// Assure a metadata label has `value` (`None` removes it).
    pub fn assure_label<T: Resource>(
        &mut self,
        resource: &mut T,
        key: &str,
        value: Option<&str>,
    ) -> &mut Self {
        let labels = resource.meta_mut().labels.get_or_insert_with(Default::default);
        match value {
            Some(value) => {
                if labels.get(key).map(String::as_str) != Some(value) {
                    labels.insert(key.to_string(), value.to_string());
                    self.modified = true;
                }
            }
            None => {
                if labels.remove(key).is_some() {
                    self.modified = true;
                }
            }
        }
        self
    }

    /// Assure a metadata annotation has `value` (`None` removes it).
    pub fn assure_annotation<T: Resource>(
        &mut self,
        resource: &mut T,
        key: &str,
        value: Option<&str>,
    ) -> &mut Self {
        let annotations = resource
            .meta_mut()
            .annotations
            .get_or_insert_with(Default::default);
        match value {
            Some(value) => {
                if annotations.get(key).map(String::as_str) != Some(value) {
                    annotations.insert(key.to_string(), value.to_string());
                    self.modified = true;
                }
            }
            None => {
                if annotations.remove(key).is_some() {
                    self.modified = true;
                }
            }
        }
        self
    }

    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }
}

/// How a status update treats the active endpoint list.
#[derive(Clone, Debug)]
pub enum ActiveUpdate {
    /// Leave the current list untouched
    Keep,
    /// Clear the list
    Clear,
    /// Replace the list (sorted by endpoint name)
    Set(Vec<LoadBalancerActive>),
}

async fn patch_status<T>(
    api: &Api<T>,
    name: &str,
    status: &serde_json::Value,
) -> Result<(), ControllerError>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await
    .map(|_| ())
    .map_err(|err| classify_kube_error(&err))
}

/// Write load balancer state, message and active list, but only when the
/// resulting status differs from the current one.
///
/// Returns whether an update was written.
///
/// # Errors
///
/// Conflicts surface as [`ControllerError::Conflict`]; other API failures
/// by their classification.
pub async fn update_lb_status(
    api: &Api<DNSLoadBalancer>,
    lb: &DNSLoadBalancer,
    state: &str,
    message: Option<&str>,
    active: ActiveUpdate,
) -> Result<bool, ControllerError> {
    let current = lb.status().cloned().unwrap_or_default();
    let mut desired = DNSLoadBalancerStatus {
        state: Some(state.to_string()),
        message: message
            .filter(|m| !m.is_empty())
            .map(ToString::to_string),
        active: current.active.clone(),
    };
    match &active {
        ActiveUpdate::Keep => {}
        ActiveUpdate::Clear => desired.active = None,
        ActiveUpdate::Set(list) => {
            let mut list = list.clone();
            list.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
            desired.active = if list.is_empty() { None } else { Some(list) };
        }
    }
    if desired == current {
        return Ok(false);
    }

    info!(
        "updating status for dns load balancer {}/{}: {state}",
        lb.namespace().unwrap_or_default(),
        lb.name_any()
    );
    let status = json!({
        "state": desired.state,
        "message": desired.message,
        "active": desired.active,
    });
    patch_status(api, &lb.name_any(), &status).await?;
    Ok(true)
}

/// Write endpoint state and health, but only on change. `valid_until` is
/// `Some(None)` to clear the deadline, `Some(Some(t))` to set it, `None` to
/// leave it untouched.
///
/// # Errors
///
/// Same classification as [`update_lb_status`].
pub async fn update_ep_status(
    api: &Api<DNSLoadBalancerEndpoint>,
    ep: &DNSLoadBalancerEndpoint,
    state: &str,
    healthy: Option<bool>,
    valid_until: Option<Option<String>>,
) -> Result<bool, ControllerError> {
    let current = ep.status().cloned().unwrap_or_default();
    let desired = DNSLoadBalancerEndpointStatus {
        state: Some(state.to_string()),
        healthy: healthy.or(current.healthy),
        valid_until: match &valid_until {
            Some(update) => update.clone(),
            None => current.valid_until.clone(),
        },
    };
    if desired == current {
        return Ok(false);
    }

    info!(
        "updating status for endpoint {}/{}: state {state}, healthy {:?}",
        ep.namespace().unwrap_or_default(),
        ep.name_any(),
        desired.healthy
    );
    let status = json!({
        "state": desired.state,
        "healthy": desired.healthy,
        "validUntil": desired.valid_until,
    });
    patch_status(api, &ep.name_any(), &status).await?;
    Ok(true)
}

/// Write provider state and message, but only on change.
///
/// # Errors
///
/// Same classification as [`update_lb_status`].
pub async fn update_provider_status(
    api: &Api<DNSProvider>,
    provider: &DNSProvider,
    state: &str,
    message: Option<&str>,
) -> Result<bool, ControllerError> {
    let current = provider.status().cloned().unwrap_or_default();
    let desired = DNSProviderStatus {
        state: Some(state.to_string()),
        message: message
            .filter(|m| !m.is_empty())
            .map(ToString::to_string),
    };
    if desired == current {
        return Ok(false);
    }

    info!(
        "updating status for dns provider {}/{}: {state}",
        provider.namespace().unwrap_or_default(),
        provider.name_any()
    );
    let status = json!({
        "state": desired.state,
        "message": desired.message,
    });
    patch_status(api, &provider.name_any(), &status).await?;
    Ok(true)
}

#[cfg(test)]
#[path = "modify_tests.rs"]
mod modify_tests;
