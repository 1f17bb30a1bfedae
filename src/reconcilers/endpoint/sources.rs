// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Source object abstraction for the endpoint reconciler.
//!
//! Services and Ingresses differ in where they carry their target addresses
//! and what makes them valid load balancer sources. Both are adapted behind
//! the [`Source`] trait and resolved through a kind-keyed [`SourceTypes`]
//! registry, so the reconciler itself is source-kind agnostic.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Client;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::cache::ObjectKey;

/// Supported source kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Service,
    Ingress,
}

impl SourceKind {
    #[must_use]
    pub fn kind_name(self) -> &'static str {
        match self {
            SourceKind::Service => "Service",
            SourceKind::Ingress => "Ingress",
        }
    }

    #[must_use]
    pub fn lowercase(self) -> &'static str {
        match self {
            SourceKind::Service => "service",
            SourceKind::Ingress => "ingress",
        }
    }

    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Service" => Some(SourceKind::Service),
            "Ingress" => Some(SourceKind::Ingress),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// Kind plus namespace/name of a source object; the reconcile key of the
/// endpoint controller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub kind: SourceKind,
    pub key: ObjectKey,
}

impl SourceKey {
    #[must_use]
    pub fn new(kind: SourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            key: ObjectKey::new(namespace, name),
        }
    }

    /// Label value identifying this source on its slave endpoints,
    /// `<kind>:<ns>/<name>`. Stable across cluster-id changes.
    #[must_use]
    pub fn label_value(&self) -> String {
        format!("{}:{}", self.kind.kind_name(), self.key)
    }

    /// Parse a [`SourceKey::label_value`] back into a key.
    #[must_use]
    pub fn parse_label_value(value: &str) -> Option<Self> {
        let (kind, rest) = value.split_once(':')?;
        let kind = SourceKind::parse(kind)?;
        let key = ObjectKey::parse(rest);
        if key.namespace.is_empty() || key.name.is_empty() {
            return None;
        }
        Some(Self { kind, key })
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Validation failure of a source object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// Transient condition (e.g. load balancer not yet assigned); retried
    Normal(String),
    /// Configuration error; reprocessed only on the next change
    Configuration(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Normal(msg) | SourceError::Configuration(msg) => f.write_str(msg),
        }
    }
}

/// A typed source object adapted for the endpoint reconciler.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn namespace(&self) -> String;
    fn name(&self) -> String;

    /// Source annotations (empty map when none are set)
    fn annotations(&self) -> BTreeMap<String, String>;

    /// Whether the source carries `finalizer`
    fn has_finalizer(&self, finalizer: &str) -> bool;

    /// Owner reference for slave endpoints living in the same cluster
    fn owner_ref(&self) -> Option<OwnerReference>;

    /// Target addresses for `lb`: `(ip, cname)`
    fn targets(&self, lb: &crate::crd::DNSLoadBalancer) -> (Option<String>, Option<String>);

    /// Check whether this source can feed `lb`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Normal`] for transient conditions,
    /// [`SourceError::Configuration`] for terminal ones.
    fn validate(&self, lb: &crate::crd::DNSLoadBalancer) -> Result<(), SourceError>;

    /// Add `finalizer` to the live source object.
    async fn ensure_finalizer(&self, client: &Client, finalizer: &str) -> anyhow::Result<()>;

    /// Remove `finalizer` from the live source object.
    async fn remove_finalizer(&self, client: &Client, finalizer: &str) -> anyhow::Result<()>;

    /// Emit an event on the source object.
    async fn emit_event(&self, client: &Client, event_type: &str, reason: &str, message: &str);

    #[must_use]
    fn source_key(&self) -> SourceKey {
        SourceKey::new(self.kind(), &self.namespace(), &self.name())
    }
}

/// Lookup of cached source objects by kind.
pub trait SourceType: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch the cached source object for `key`, adapted to [`Source`].
    fn get(&self, key: &ObjectKey) -> Option<Arc<dyn Source>>;
}

/// Kind-keyed source type registry, populated during wiring.
#[derive(Default)]
pub struct SourceTypes {
    types: HashMap<SourceKind, Arc<dyn SourceType>>,
}

impl SourceTypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source type. Duplicate kinds are a wiring error.
    ///
    /// # Panics
    ///
    /// Panics when the kind is already registered.
    #[must_use]
    pub fn with(mut self, source_type: Arc<dyn SourceType>) -> Self {
        let kind = source_type.kind();
        assert!(
            self.types.insert(kind, source_type).is_none(),
            "duplicate source type '{kind}'"
        );
        self
    }

    #[must_use]
    pub fn get(&self, key: &SourceKey) -> Option<Arc<dyn Source>> {
        self.types.get(&key.kind)?.get(&key.key)
    }
}

#[cfg(test)]
#[path = "sources_tests.rs"]
mod sources_tests;
