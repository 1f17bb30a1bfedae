// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! AWS Route 53 provider.
//!
//! Hosted zones are listed once at construction; this doubles as a
//! credential check before the provider is registered. Record changes are
//! submitted per zone in planned batches (deletes first, at most
//! [`crate::constants::MAX_CHANGE_COUNT`] changes per batch).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_route53::config::{Credentials, Region};
use aws_sdk_route53::types::{
    Change, ChangeAction as AwsChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet,
    RrType,
};
use aws_sdk_route53::Client;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dns::plan::{plan_default_batches, ChangeAction, ChangeRequest};
use crate::dns::provider::{DnsProvider, Properties, ProviderFactory};
use crate::dns::set::{map_from_provider, map_to_provider, DnsSet, DnsSets, RecordSet, RecordType};

/// Registered type name for this provider
pub const PROVIDER_TYPE_AWS: &str = "aws";

/// Default region used when the secret does not name one
const DEFAULT_REGION: &str = "us-west-2";

/// Route 53 backed [`DnsProvider`].
pub struct Route53Provider {
    config: Properties,
    dry_run: bool,
    client: Client,
    /// zone id -> zone name (with trailing dot)
    zones: HashMap<String, String>,
}

impl Route53Provider {
    /// Build a provider from secret credentials and list its hosted zones.
    ///
    /// An empty config falls back to the ambient AWS environment (static
    /// provider mode).
    ///
    /// # Errors
    ///
    /// Fails when required credential keys are missing or the zone listing
    /// is rejected.
    pub async fn from_properties(name: &str, config: Properties, dry_run: bool) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if !config.is_empty() {
            let access_key = config
                .get("AWS_ACCESS_KEY_ID")
                .filter(|v| !v.is_empty())
                .context("'AWS_ACCESS_KEY_ID' required in secret")?;
            let secret_key = config
                .get("AWS_SECRET_ACCESS_KEY")
                .filter(|v| !v.is_empty())
                .context("'AWS_SECRET_ACCESS_KEY' required in secret")?;
            let session_token = config.get("AWS_SESSION_TOKEN").filter(|v| !v.is_empty());
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                session_token.cloned(),
                None,
                "dnslb-secret",
            ));
        }
        let region = config
            .get("AWS_REGION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        loader = loader.region(Region::new(region));

        let shared = loader.load().await;
        let client = Client::new(&shared);

        let zones = Self::list_zones(&client).await?;
        info!("provider '{name}': found {} zone(s)", zones.len());
        for (id, zone_name) in &zones {
            debug!("provider '{name}': zone '{id}': {zone_name}");
        }

        Ok(Self {
            config,
            dry_run,
            client,
            zones,
        })
    }

    async fn list_zones(client: &Client) -> Result<HashMap<String, String>> {
        let mut zones = HashMap::new();
        let mut pages = client.list_hosted_zones().into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.context("cannot list hosted zones")?;
            for zone in page.hosted_zones() {
                let id = zone
                    .id()
                    .rsplit('/')
                    .next()
                    .unwrap_or_else(|| zone.id())
                    .to_string();
                zones.insert(id, zone.name().to_string());
            }
        }
        Ok(zones)
    }

    fn zone_for(&self, dns: &str) -> Option<(String, usize)> {
        let hostname = align_hostname(dns);
        let mut matched = "";
        let mut found = None;
        for (zone_id, zone_name) in &self.zones {
            let hit = hostname == *zone_name || hostname.ends_with(&format!(".{zone_name}"));
            if hit && zone_name.len() > matched.len() {
                matched = zone_name;
                found = Some(zone_id.clone());
            }
        }
        found.map(|id| (id, matched.len().saturating_sub(1)))
    }

    async fn add_all_records(&self, zone_id: &str, sets: &mut DnsSets) -> Result<()> {
        let mut pages = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("cannot list records of zone {zone_id}"))?;
            for rrs in page.resource_record_sets() {
                let Some(rtype) = RecordType::parse(rrs.r#type().as_str()) else {
                    continue;
                };
                let name = rrs.name().trim_end_matches('.').to_string();

                let mut record_set = RecordSet::new(rtype, rrs.ttl().unwrap_or(0));
                for rr in rrs.resource_records() {
                    record_set.add(rr.value());
                }

                let mut tmp = DnsSet::new(name);
                tmp.zone = Some(zone_id.to_string());
                tmp.sets.insert(rtype, record_set.clone());
                let mapped = map_from_provider(rtype, &tmp);

                match sets.get_mut(&mapped) {
                    Some(existing) => {
                        existing.sets.insert(rtype, record_set);
                    }
                    None => {
                        tmp.name = mapped.clone();
                        sets.insert(mapped, tmp);
                    }
                }
            }
        }
        Ok(())
    }

    /// Zone the request belongs to, or `None` when it cannot be placed.
    fn request_zone(&self, request: &ChangeRequest) -> Option<String> {
        if let Some(zone) = request.set.zone.clone() {
            return Some(zone);
        }
        match self.zone_for(&request.set.name) {
            Some((zone, _)) => Some(zone),
            None => {
                warn!("no zone for '{}', skipping change", request.set.name);
                None
            }
        }
    }

    fn build_change(&self, request: &ChangeRequest) -> Result<Change> {
        let record_set = request
            .set
            .sets
            .get(&request.rtype)
            .context("change request without record set")?;

        let name = align_hostname(&map_to_provider(request.rtype, &request.set));
        let action = match request.action {
            ChangeAction::Create => AwsChangeAction::Create,
            ChangeAction::Update => AwsChangeAction::Upsert,
            ChangeAction::Delete => AwsChangeAction::Delete,
        };
        let rtype = match request.rtype {
            RecordType::A => RrType::A,
            RecordType::Cname => RrType::Cname,
            RecordType::Txt => RrType::Txt,
        };

        info!(
            "{} {} record set {name}: {}",
            request.action,
            request.rtype,
            record_set.record_string()
        );

        let mut builder = ResourceRecordSet::builder()
            .name(name)
            .r#type(rtype)
            .ttl(record_set.ttl);
        for record in &record_set.records {
            builder = builder.resource_records(
                ResourceRecord::builder().value(record.value.clone()).build()?,
            );
        }
        let change = Change::builder()
            .action(action)
            .resource_record_set(builder.build()?)
            .build()?;
        Ok(change)
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_AWS
    }

    fn config(&self) -> &Properties {
        &self.config
    }

    fn domains(&self) -> BTreeSet<String> {
        self.zones
            .values()
            .map(|name| name.trim_end_matches('.').to_string())
            .collect()
    }

    fn match_name(&self, dns: &str) -> Option<(String, usize)> {
        self.zone_for(dns)
    }

    async fn get_dns_sets(&self) -> Result<DnsSets> {
        let mut sets = DnsSets::new();
        let mut count = 0;
        for zone_id in self.zones.keys() {
            self.add_all_records(zone_id, &mut sets).await?;
            debug!("found {} entries in zone {zone_id}", sets.len() - count);
            count = sets.len();
        }
        Ok(sets)
    }

    async fn execute_requests(&self, requests: &[ChangeRequest]) -> Result<()> {
        let mut by_zone: HashMap<String, Vec<ChangeRequest>> = HashMap::new();
        for request in requests {
            let has_records = request
                .set
                .sets
                .get(&request.rtype)
                .is_some_and(|rs| !rs.records.is_empty());
            if !has_records {
                continue;
            }
            if let Some(zone_id) = self.request_zone(request) {
                by_zone.entry(zone_id).or_default().push(request.clone());
            }
        }

        if self.dry_run {
            info!("no changes in dryrun mode for AWS");
            for zone_requests in by_zone.values() {
                for request in zone_requests {
                    debug!(
                        "dryrun: {} {} {}",
                        request.action, request.rtype, request.set.name
                    );
                    request.succeeded().await;
                }
            }
            return Ok(());
        }

        let mut failed = false;
        for (zone_id, zone_requests) in by_zone {
            let batches = plan_default_batches(&zone_requests);
            for (index, batch) in batches.iter().enumerate() {
                info!("processing batch {} for zone {zone_id}", index + 1);
                let mut changes = Vec::with_capacity(batch.len());
                for request in batch {
                    changes.push(self.build_change(request)?);
                }

                let result = self
                    .client
                    .change_resource_record_sets()
                    .hosted_zone_id(&zone_id)
                    .change_batch(ChangeBatch::builder().set_changes(Some(changes)).build()?)
                    .send()
                    .await;

                match result {
                    Ok(_) => {
                        for request in batch {
                            request.succeeded().await;
                        }
                        info!(
                            "{} change(s) in zone {zone_id} were successfully updated",
                            batch.len()
                        );
                    }
                    Err(err) => {
                        let message = err.to_string();
                        warn!("change batch for zone {zone_id} failed: {message}");
                        for request in batch {
                            request.failed(&message).await;
                        }
                        failed = true;
                    }
                }
            }
        }
        if failed {
            bail!("some Route 53 change batches failed");
        }
        Ok(())
    }
}

/// Factory for `type: aws` providers.
pub struct Route53Factory {
    dry_run: bool,
}

impl Route53Factory {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

#[async_trait]
impl ProviderFactory for Route53Factory {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_AWS
    }

    async fn create(
        &self,
        name: &str,
        config: Properties,
        dry_run: bool,
    ) -> Result<Arc<dyn DnsProvider>> {
        let provider =
            Route53Provider::from_properties(name, config, dry_run || self.dry_run).await?;
        Ok(Arc::new(provider))
    }
}

fn align_hostname(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    }
}

#[cfg(test)]
#[path = "route53_tests.rs"]
mod route53_tests;
