// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider capability trait, registrations and the provider registry.
//!
//! A [`Registration`] couples a named [`DnsProvider`] implementation with an
//! optional namespace [`AccessControl`] and a config snapshot used for
//! equality-based change detection during hot reconfiguration.
//!
//! The [`ProviderRegistry`] enforces domain exclusivity: a registration is
//! rejected when any of its domains is already served by another registered
//! provider, so two providers can never fight over one hosted zone.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::crd::{ProviderScope, ScopeType};
use crate::dns::plan::ChangeRequest;
use crate::dns::set::DnsSets;

/// Flattened provider credentials (secret data as UTF-8 strings).
pub type Properties = BTreeMap<String, String>;

/// Capability set every DNS provider implementation offers.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Registered type name (e.g. `aws`)
    fn type_name(&self) -> &str;

    /// Config snapshot used to detect credential changes
    fn config(&self) -> &Properties;

    /// All domains (hosted zone names, no trailing dot) this provider serves
    fn domains(&self) -> BTreeSet<String>;

    /// Longest-suffix zone match for a fully qualified name.
    ///
    /// Returns the provider-specific zone handle and the length of the
    /// matched zone suffix; `None` when the name is outside every zone.
    fn match_name(&self, dns: &str) -> Option<(String, usize)>;

    /// Load all record bundles currently stored at the provider
    async fn get_dns_sets(&self) -> Result<DnsSets>;

    /// Apply a list of change requests, invoking each bundle's feedback
    /// handler with the per-batch outcome
    async fn execute_requests(&self, requests: &[ChangeRequest]) -> Result<()>;
}

/// Namespace filter derived from a provider scope.
#[derive(Clone, Debug, Default)]
pub struct AccessControl {
    namespaces: Option<BTreeSet<String>>,
}

impl AccessControl {
    /// Accept every namespace.
    #[must_use]
    pub fn all() -> Self {
        Self { namespaces: None }
    }

    /// Accept only the listed namespaces.
    #[must_use]
    pub fn selected(namespaces: impl IntoIterator<Item = String>) -> Self {
        Self {
            namespaces: Some(namespaces.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn valid_for(&self, namespace: &str) -> bool {
        match &self.namespaces {
            None => true,
            Some(set) => set.contains(namespace),
        }
    }
}

/// Evaluate a provider scope into an [`AccessControl`].
///
/// An absent scope or scope type is filled in with `Cluster`; superfluous
/// namespace lists on `Cluster`/`Namespace` scopes are cleared. The returned
/// flag reports whether `scope` was normalized and needs to be written back.
pub fn eval_scope(own_namespace: &str, scope: &mut Option<ProviderScope>) -> (AccessControl, bool) {
    let mut modified = false;

    let scope = scope.get_or_insert_with(|| {
        modified = true;
        ProviderScope {
            r#type: Some(ScopeType::Cluster),
            namespaces: None,
        }
    });
    if scope.r#type.is_none() {
        scope.r#type = Some(ScopeType::Cluster);
        scope.namespaces = None;
        modified = true;
    }

    let access = match scope.r#type {
        Some(ScopeType::Cluster) | None => {
            if scope.namespaces.as_ref().is_some_and(|n| !n.is_empty()) {
                scope.namespaces = None;
                modified = true;
            }
            AccessControl::all()
        }
        Some(ScopeType::Namespace) => {
            if scope.namespaces.as_ref().is_some_and(|n| !n.is_empty()) {
                scope.namespaces = None;
                modified = true;
            }
            AccessControl::selected([own_namespace.to_string()])
        }
        Some(ScopeType::Selected) => {
            AccessControl::selected(scope.namespaces.clone().unwrap_or_default())
        }
    };
    (access, modified)
}

/// A registered provider with its access control and config snapshot.
pub struct Registration {
    name: String,
    provider: Arc<dyn DnsProvider>,
    access: RwLock<Option<AccessControl>>,
}

impl Registration {
    #[must_use]
    pub fn new(name: &str, provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            name: name.to_string(),
            provider,
            access: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn DnsProvider> {
        self.provider.clone()
    }

    #[must_use]
    pub fn type_name(&self) -> String {
        self.provider.type_name().to_string()
    }

    #[must_use]
    pub fn config(&self) -> Properties {
        self.provider.config().clone()
    }

    #[must_use]
    pub fn domains(&self) -> BTreeSet<String> {
        self.provider.domains()
    }

    #[must_use]
    pub fn match_name(&self, dns: &str) -> Option<(String, usize)> {
        self.provider.match_name(dns)
    }

    /// Replace the attached access control (hot reconfiguration keeps the
    /// provider instance and swaps only the scope).
    pub fn set_access_control(&self, access: Option<AccessControl>) {
        *self.access.write().expect("access control poisoned") = access;
    }

    /// Whether load balancers in `namespace` may use this provider.
    /// No attached access control accepts everything.
    #[must_use]
    pub fn valid_for(&self, namespace: &str) -> bool {
        self.access
            .read()
            .expect("access control poisoned")
            .as_ref()
            .is_none_or(|access| access.valid_for(namespace))
    }
}

/// Concurrent name-to-registration catalog with domain-conflict detection.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, Arc<Registration>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that none of `domains` is already served by a different
    /// registration.
    ///
    /// # Errors
    ///
    /// Returns `duplicate domain '<d>' with '<other>'` on overlap.
    pub fn validate_domains(&self, name: &str, domains: &BTreeSet<String>) -> Result<()> {
        let providers = self.providers.lock().expect("provider registry poisoned");
        for (other_name, other) in providers.iter() {
            if other_name == name {
                continue;
            }
            let have = other.domains();
            for domain in domains {
                if have.contains(domain) {
                    bail!("duplicate domain '{domain}' with '{other_name}'");
                }
            }
        }
        Ok(())
    }

    /// Validate and register a provider under `name`, replacing any previous
    /// registration of the same name.
    ///
    /// # Errors
    ///
    /// Returns the domain-conflict error of [`ProviderRegistry::validate_domains`].
    pub fn register(
        &self,
        name: &str,
        provider: Arc<dyn DnsProvider>,
        access: Option<AccessControl>,
    ) -> Result<Arc<Registration>> {
        self.validate_domains(name, &provider.domains())?;
        let registration = Arc::new(Registration::new(name, provider));
        registration.set_access_control(access);
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .insert(name.to_string(), registration.clone());
        Ok(registration)
    }

    /// Remove and return the registration for `name`.
    pub fn unregister(&self, name: &str) -> Option<Arc<Registration>> {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Registration>> {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .get(name)
            .cloned()
    }

    /// Stable snapshot of all current registrations.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Registration>> {
        let providers = self.providers.lock().expect("provider registry poisoned");
        let mut regs: Vec<Arc<Registration>> = providers.values().cloned().collect();
        regs.sort_by(|a, b| a.name.cmp(&b.name));
        regs
    }
}

/// Factory constructing providers of one type from secret credentials.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Type name users reference in `DNSProvider.spec.type`
    fn type_name(&self) -> &str;

    /// Build a provider instance named `name` from `config`.
    async fn create(
        &self,
        name: &str,
        config: Properties,
        dry_run: bool,
    ) -> Result<Arc<dyn DnsProvider>>;
}

/// Table of provider type factories, populated during wiring and immutable
/// afterwards.
#[derive(Default)]
pub struct ProviderTypes {
    types: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderTypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. Duplicate type names are a wiring error.
    ///
    /// # Panics
    ///
    /// Panics when the type name is already registered.
    #[must_use]
    pub fn with(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        let name = factory.type_name().to_string();
        assert!(
            self.types.insert(name.clone(), factory).is_none(),
            "duplicate provider type '{name}'"
        );
        self
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.types.get(type_name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
