// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for DNS load balancing.
//!
//! This module defines the Kubernetes Custom Resource Definitions used by the
//! dnslb controller to realize user-declared DNS names as health-filtered
//! record sets in external DNS providers.
//!
//! # Resource Types
//!
//! - [`DNSLoadBalancer`] - A user-declared DNS name with health probing rules
//! - [`DNSLoadBalancerEndpoint`] - A candidate target for a load balancer,
//!   created by the endpoint reconciler on behalf of an annotated Service or
//!   Ingress
//! - [`DNSProvider`] - A credentialed DNS provider account (e.g. AWS Route 53)
//!
//! # Example: Declaring a load balancer
//!
//! ```yaml
//! apiVersion: dnslb.firestoned.io/v1beta1
//! kind: DNSLoadBalancer
//! metadata:
//!   name: mylb
//!   namespace: app
//! spec:
//!   dnsName: svc.example.com
//!   healthPath: /healthz
//!   type: Balanced
//!   ttl: 60
//! ```

use k8s_openapi::api::core::v1::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::DEFAULT_STATUS_CODE;

// ============================================================================
// State Constants
// ============================================================================

/// Resource has not been reconciled yet or is awaiting provider feedback
pub const STATE_PENDING: &str = "Pending";

/// Load balancer DNS name resolves and answers its health probe
pub const STATE_HEALTHY: &str = "Healthy";

/// Load balancer DNS name does not resolve or fails its health probe
pub const STATE_UNREACHABLE: &str = "Unreachable";

/// Reconciliation failed; see `.status.message`
pub const STATE_ERROR: &str = "Error";

/// Resource is semantically invalid and will not be reconciled until changed
pub const STATE_INVALID: &str = "Invalid";

/// Endpoint is part of the published record set
pub const STATE_ACTIVE: &str = "Active";

/// Endpoint is known but not part of the published record set
pub const STATE_INACTIVE: &str = "Inactive";

// ============================================================================
// DNSLoadBalancer
// ============================================================================

/// Load balancer mode deciding how many healthy endpoints become active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LoadBalancerType {
    /// All healthy endpoints are published
    Balanced,
    /// At most one healthy endpoint is published at any time
    Exclusive,
}

impl LoadBalancerType {
    #[must_use]
    pub fn is_exclusive(self) -> bool {
        matches!(self, LoadBalancerType::Exclusive)
    }
}

/// An active endpoint entry in the load balancer status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerActive {
    /// Name of the `DNSLoadBalancerEndpoint` backing this entry
    pub endpoint: String,

    /// IP address published for this entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// CNAME published for this entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
}

/// `DNSLoadBalancer` status written by the DNS reconciler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSLoadBalancerStatus {
    /// One of Pending, Healthy, Unreachable, Error, Invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Human-readable detail for non-healthy states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Endpoints currently included in the published record set,
    /// ordered by endpoint name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<Vec<LoadBalancerActive>>,
}

/// `DNSLoadBalancer` declares a DNS name that is kept pointing at the healthy
/// subset of its endpoints.
///
/// The DNS reconciler probes `https://<dnsName><healthPath>` for the name
/// itself and for every endpoint target (with a `Host` header override), then
/// publishes the active set to whichever registered [`DNSProvider`] owns the
/// name's zone. Records written by this controller carry a TXT ownership tag
/// so that multiple controller instances can share a hosted zone.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dnslb.firestoned.io",
    version = "v1beta1",
    kind = "DNSLoadBalancer",
    namespaced,
    shortname = "dnslb",
    doc = "DNSLoadBalancer declares a DNS name resolved to the healthy subset of its endpoints.",
    printcolumn = r#"{"name":"DNSName","type":"string","jsonPath":".spec.dnsName"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#
)]
#[kube(status = "DNSLoadBalancerStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSLoadBalancerSpec {
    /// Fully qualified DNS name to manage. Unique across active load balancers.
    pub dns_name: String,

    /// URL path probed on the DNS name and on every endpoint target
    #[serde(default)]
    pub health_path: String,

    /// Expected HTTP status code of a healthy probe (default 200)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,

    /// Load balancer mode. Balanced publishes all healthy endpoints,
    /// Exclusive at most one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<LoadBalancerType>,

    /// Legacy singleton flag. Normalized into `type` on first reconcile;
    /// setting both is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton: Option<bool>,

    /// TTL in seconds for published records (default taken from `--ttl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Lifetime granted to endpoint children, as a duration string
    /// (e.g. `"10m"`). Endpoints whose deadline passes without refresh are
    /// garbage collected. Absent means endpoints never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_validity_interval: Option<String>,
}

impl DNSLoadBalancer {
    /// Expected probe status code, defaulted to 200.
    #[must_use]
    pub fn effective_status_code(&self) -> i32 {
        match self.spec.status_code {
            Some(c) if c != 0 => c,
            _ => DEFAULT_STATUS_CODE,
        }
    }

    /// Parsed endpoint validity interval, if configured.
    ///
    /// Unparsable values are treated as absent; the field stays a
    /// free-form string for forward compatibility.
    #[must_use]
    pub fn validity_interval(&self) -> Option<Duration> {
        let raw = self.spec.endpoint_validity_interval.as_deref()?;
        match humantime::parse_duration(raw) {
            Ok(d) if !d.is_zero() => Some(d),
            _ => None,
        }
    }
}

// ============================================================================
// DNSLoadBalancerEndpoint
// ============================================================================

/// `DNSLoadBalancerEndpoint` status written by the DNS reconciler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSLoadBalancerEndpointStatus {
    /// One of Pending, Active, Inactive, Invalid, Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Outcome of the most recent health probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,

    /// RFC3339 deadline after which this endpoint is garbage collected.
    /// Refreshed by the endpoint reconciler while the source is valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
}

/// `DNSLoadBalancerEndpoint` is a candidate target of a [`DNSLoadBalancer`],
/// maintained as the slave of exactly one annotated source object.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dnslb.firestoned.io",
    version = "v1beta1",
    kind = "DNSLoadBalancerEndpoint",
    namespaced,
    shortname = "dnslbep",
    doc = "DNSLoadBalancerEndpoint is one candidate target of a DNSLoadBalancer.",
    printcolumn = r#"{"name":"LoadBalancer","type":"string","jsonPath":".spec.loadBalancer"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ipAddress"}"#,
    printcolumn = r#"{"name":"CNAME","type":"string","jsonPath":".spec.cname"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Healthy","type":"boolean","jsonPath":".status.healthy"}"#
)]
#[kube(status = "DNSLoadBalancerEndpointStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSLoadBalancerEndpointSpec {
    /// Name of the owning `DNSLoadBalancer` in the same namespace
    pub load_balancer: String,

    /// Target IP address. At least one of `ipAddress` and `cname` must be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Target hostname. At least one of `ipAddress` and `cname` must be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
}

impl DNSLoadBalancerEndpoint {
    /// An endpoint is only usable when it carries an address.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.spec.ip_address.as_deref().is_some_and(|s| !s.is_empty())
            || self.spec.cname.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Parsed validity deadline, if present and well-formed.
    #[must_use]
    pub fn valid_until(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.status.as_ref()?.valid_until.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

// ============================================================================
// DNSProvider
// ============================================================================

/// Namespace visibility of a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ScopeType {
    /// Provider serves load balancers in every namespace
    Cluster,
    /// Provider serves only its own namespace
    Namespace,
    /// Provider serves the namespaces listed in `scope.namespaces`
    Selected,
}

/// Scope restricting which namespaces may use a provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderScope {
    /// Scope type. Absent is normalized to `Cluster` and written back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ScopeType>,

    /// Namespace list for `Selected` scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

/// `DNSProvider` status written by the provider reconciler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderStatus {
    /// One of Pending, Active, Error, Invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Human-readable detail for non-active states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `DNSProvider` registers a credentialed DNS provider account.
///
/// On registration the provider's hosted zones are listed and checked for
/// domain overlap with every other registered provider; overlapping
/// registrations are rejected. The referenced secret is finalizer-protected
/// while the provider is registered.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dnslb.firestoned.io",
    version = "v1beta1",
    kind = "DNSProvider",
    namespaced,
    shortname = "dnsprov",
    doc = "DNSProvider registers a credentialed external DNS provider account.",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#
)]
#[kube(status = "DNSProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderSpec {
    /// Registered provider type name (e.g. `aws`)
    #[serde(default)]
    pub r#type: String,

    /// Reference to the secret holding provider credentials.
    /// An absent namespace defaults to the provider's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,

    /// Namespace scope of this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ProviderScope>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
