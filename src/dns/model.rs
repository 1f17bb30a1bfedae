// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Convergence model turning desired targets into provider change requests.
//!
//! One [`Model`] instance exists per DNS reconciler and is [`Model::reset`]
//! at the start of every tick, snapshotting the provider registry. During
//! the tick [`Model::apply`] records the desired record bundle per DNS name
//! and accumulates create/update/delete requests; [`Model::update`] then
//! sweeps every loaded provider for owned-but-unapplied bundles (which get
//! deleted) and submits each provider's request list.
//!
//! Ownership discipline: a bundle whose TXT set lacks our owner tag is never
//! mutated in any direction. Newly created bundles get the owner and prefix
//! attributes; multi-target CNAME sets are expanded to A records with the
//! original targets remembered in the `cnames` attribute.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::dns::lookup::HostResolver;
use crate::dns::plan::{ChangeAction, ChangeRequest};
use crate::dns::provider::{ProviderRegistry, Registration};
use crate::dns::set::{
    map_to_provider, DnsSet, DnsSets, DoneHandler, RecordType, ATTR_CNAMES, ATTR_PREFIX,
};
use crate::constants::TXT_RECORD_PREFIX;

/// One desired target of a DNS name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsTarget {
    pub rtype: RecordType,
    pub host: String,
}

impl DnsTarget {
    #[must_use]
    pub fn a(host: impl Into<String>) -> Self {
        Self {
            rtype: RecordType::A,
            host: host.into(),
        }
    }

    #[must_use]
    pub fn cname(host: impl Into<String>) -> Self {
        Self {
            rtype: RecordType::Cname,
            host: host.into(),
        }
    }
}

/// Per-tick convergence state.
pub struct Model {
    identity: String,
    default_ttl: i64,
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn HostResolver>,

    providers: Vec<Arc<Registration>>,
    loaded: HashMap<String, DnsSets>,
    applied: HashMap<String, DnsSet>,
    requests: HashMap<String, Vec<ChangeRequest>>,
}

impl Model {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn HostResolver>,
        identity: &str,
        default_ttl: i64,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            default_ttl,
            registry,
            resolver,
            providers: Vec::new(),
            loaded: HashMap::new(),
            applied: HashMap::new(),
            requests: HashMap::new(),
        }
    }

    /// Clear pending requests and loaded provider state, snapshot the
    /// current registrations.
    pub fn reset(&mut self) {
        self.providers = self.registry.snapshot();
        self.loaded.clear();
        self.applied.clear();
        self.requests.clear();
    }

    /// Restrict the model to a fixed registration list (used for the
    /// throwaway models of the provider delete path).
    pub fn reset_for(&mut self, registrations: Vec<Arc<Registration>>) {
        self.providers = registrations;
        self.loaded.clear();
        self.applied.clear();
        self.requests.clear();
    }

    /// Report whether applying `targets` for `name` would change provider
    /// state, without recording any intent.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Model::apply`].
    pub async fn check(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        ttl: Option<i64>,
        done: Option<Arc<dyn DoneHandler>>,
        targets: &[DnsTarget],
    ) -> Result<bool> {
        self.exec(false, name, namespace, ttl, done, targets).await
    }

    /// Record the desired bundle for `name` and enqueue the change requests
    /// needed to converge the owning provider.
    ///
    /// # Errors
    ///
    /// Fails when no provider serves the name, the provider's scope rejects
    /// `namespace`, or the provider's current state cannot be loaded. The
    /// feedback handler is informed before the error returns.
    pub async fn apply(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        ttl: Option<i64>,
        done: Option<Arc<dyn DoneHandler>>,
        targets: &[DnsTarget],
    ) -> Result<bool> {
        self.exec(true, name, namespace, ttl, done, targets).await
    }

    async fn exec(
        &mut self,
        apply: bool,
        name: &str,
        namespace: Option<&str>,
        ttl: Option<i64>,
        done: Option<Arc<dyn DoneHandler>>,
        targets: &[DnsTarget],
    ) -> Result<bool> {
        if targets.is_empty() {
            return Ok(false);
        }

        let Some((zone, registration)) = self.lookup_provider(name) else {
            if let Some(done) = &done {
                done.invalid(&format!("no provider found for '{name}'")).await;
            }
            bail!("no provider found for '{name}'");
        };

        if let Some(ns) = namespace {
            if !registration.valid_for(ns) {
                if let Some(done) = &done {
                    done.invalid(&format!(
                        "provider '{}' not valid for namespace '{ns}'",
                        registration.name()
                    ))
                    .await;
                }
                bail!(
                    "provider '{}' not valid for namespace '{ns}'",
                    registration.name()
                );
            }
        }

        let provider_name = registration.name().to_string();
        self.load_provider(&registration).await.map_err(|err| {
            anyhow::anyhow!("cannot get DNS records for '{name}': {err}")
        })?;
        let current = self
            .loaded
            .get(&provider_name)
            .and_then(|sets| sets.get(name))
            .cloned();

        if let Some(current) = &current {
            if !current.is_owned_by(&self.identity) {
                if let Some(done) = &done {
                    done.invalid(&format!(
                        "'{name}' is not owned by '{}'",
                        self.identity
                    ))
                    .await;
                }
                bail!("'{name}' is not owned by '{}'", self.identity);
            }
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let newset = self
            .new_dnsset_for_targets(name, current.as_ref(), &zone, done, ttl, targets)
            .await;
        debug!("applying {} targets for {name}", targets.len());

        let mut modified = false;
        if let Some(current) = &current {
            for (rtype, rset) in &newset.sets {
                match current.sets.get(rtype) {
                    None => {
                        if apply {
                            self.add_request(&provider_name, ChangeAction::Create, *rtype, &newset);
                        }
                        modified = true;
                    }
                    Some(currset) => {
                        if map_to_provider(*rtype, current) == map_to_provider(*rtype, &newset) {
                            if currset.matches(rset) {
                                if apply {
                                    debug!("records type {rtype} up to date for {name}");
                                }
                            } else {
                                if apply {
                                    self.add_request(
                                        &provider_name,
                                        ChangeAction::Update,
                                        *rtype,
                                        &newset,
                                    );
                                }
                                modified = true;
                            }
                        } else {
                            // the provider-side name moved (prefix change)
                            if apply {
                                self.add_request(&provider_name, ChangeAction::Create, *rtype, &newset);
                                self.add_request(&provider_name, ChangeAction::Delete, *rtype, current);
                            }
                            modified = true;
                        }
                    }
                }
            }
            for rtype in current.sets.keys() {
                // TXT companions are only removed together with their owner
                if *rtype != RecordType::Txt && !newset.sets.contains_key(rtype) {
                    if apply {
                        self.add_request(&provider_name, ChangeAction::Delete, *rtype, current);
                    }
                    modified = true;
                }
            }
        } else {
            if apply {
                for rtype in newset.sets.keys() {
                    self.add_request(&provider_name, ChangeAction::Create, *rtype, &newset);
                }
            }
            modified = true;
        }

        if apply {
            self.applied.insert(name.to_string(), newset);
        }
        Ok(modified)
    }

    /// Sweep owned-but-unapplied bundles into delete requests, then submit
    /// every provider's request list.
    ///
    /// # Errors
    ///
    /// Fails when a provider's state cannot be loaded or any provider
    /// submission fails; remaining providers are still submitted.
    pub async fn update(&mut self) -> Result<()> {
        let providers = self.providers.clone();
        for registration in &providers {
            if let Err(err) = self.load_provider(registration).await {
                error!(
                    "cannot get DNS records for provider '{}': {err}",
                    registration.name()
                );
                bail!(
                    "cannot get DNS records for provider '{}': {err}",
                    registration.name()
                );
            }
            let provider_name = registration.name().to_string();
            let orphans: Vec<DnsSet> = self
                .loaded
                .get(&provider_name)
                .map(|sets| {
                    sets.values()
                        .filter(|set| {
                            !self.applied.contains_key(&set.name)
                                && set.is_owned_by(&self.identity)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for orphan in orphans {
                info!("found unapplied managed set '{}'", orphan.name);
                for rtype in orphan.sets.keys() {
                    self.add_request(&provider_name, ChangeAction::Delete, *rtype, &orphan);
                }
            }
        }

        let mut failed = false;
        let requests = std::mem::take(&mut self.requests);
        for (provider_name, reqs) in requests {
            info!("update provider {provider_name}");
            let Some(registration) = providers
                .iter()
                .find(|r| r.name() == provider_name)
            else {
                continue;
            };
            if let Err(err) = registration.provider().execute_requests(&reqs).await {
                error!("update failed for provider {provider_name}: {err}");
                failed = true;
            }
        }
        if failed {
            bail!("update failed for some provider(s)");
        }
        Ok(())
    }

    /// Pending request count, for observability and tests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.values().map(Vec::len).sum()
    }

    fn lookup_provider(&self, dns: &str) -> Option<(String, Arc<Registration>)> {
        let mut best: Option<(String, Arc<Registration>, usize)> = None;
        for registration in &self.providers {
            if let Some((zone, n)) = registration.match_name(dns) {
                if best.as_ref().is_none_or(|(_, _, m)| n > *m) {
                    best = Some((zone, registration.clone(), n));
                }
            }
        }
        best.map(|(zone, registration, _)| (zone, registration))
    }

    async fn load_provider(&mut self, registration: &Arc<Registration>) -> Result<()> {
        let name = registration.name().to_string();
        if !self.loaded.contains_key(&name) {
            let sets = registration.provider().get_dns_sets().await?;
            self.loaded.insert(name, sets);
        }
        Ok(())
    }

    fn add_request(
        &mut self,
        provider: &str,
        action: ChangeAction,
        rtype: RecordType,
        set: &DnsSet,
    ) {
        let request = ChangeRequest::new(action, rtype, set.clone());
        let queue = self.requests.entry(provider.to_string()).or_default();
        if action == ChangeAction::Delete {
            queue.insert(0, request);
        } else {
            queue.push(request);
        }
    }

    async fn new_dnsset_for_targets(
        &self,
        name: &str,
        base: Option<&DnsSet>,
        zone: &str,
        done: Option<Arc<dyn DoneHandler>>,
        ttl: i64,
        targets: &[DnsTarget],
    ) -> DnsSet {
        let mut set = DnsSet::new(name);
        set.zone = Some(zone.to_string());
        set.done = done;

        if let Some(base) = base {
            if let Some(txt) = base.sets.get(&RecordType::Txt) {
                set.sets.insert(RecordType::Txt, txt.clone());
            }
        }
        let owned = base.is_none_or(|b| b.is_owned_by(&self.identity));
        if owned {
            set.set_owner(&self.identity);
            set.set_attr(ATTR_PREFIX, TXT_RECORD_PREFIX);
        }

        let mut cnames = Vec::new();
        for target in targets {
            if target.rtype == RecordType::Cname && targets.len() > 1 {
                cnames.push(target.host.clone());
                match self.resolver.lookup_ips(&target.host).await {
                    Ok(addrs) => {
                        for addr in &addrs {
                            set.add_record(RecordType::A, addr.to_string(), ttl);
                        }
                        debug!(
                            "mapping target '{}' to {} A record(s)",
                            target.host,
                            addrs.len()
                        );
                    }
                    Err(err) => error!("cannot lookup '{}': {err}", target.host),
                }
            } else {
                set.add_record(target.rtype, target.host.clone(), ttl);
            }
        }
        if !cnames.is_empty() && set.is_owned_by(&self.identity) {
            cnames.sort();
            set.set_attr(ATTR_CNAMES, &cnames.join(","));
        }
        set
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
