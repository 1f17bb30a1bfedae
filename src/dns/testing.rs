// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fake provider shared by the dns module tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Mutex;

use crate::dns::lookup::HostResolver;
use crate::dns::plan::ChangeRequest;
use crate::dns::provider::{DnsProvider, Properties};
use crate::dns::set::{DnsSets, DoneHandler};

/// Fake provider serving a fixed set of zones from memory.
pub struct FakeProvider {
    type_name: String,
    config: Properties,
    zones: Vec<String>,
    pub sets: Mutex<DnsSets>,
    pub executed: Mutex<Vec<ChangeRequest>>,
    pub fail_execute: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(zones: &[&str]) -> Self {
        Self {
            type_name: "fake".to_string(),
            config: Properties::new(),
            zones: zones.iter().map(|z| (*z).to_string()).collect(),
            sets: Mutex::new(DnsSets::new()),
            executed: Mutex::new(Vec::new()),
            fail_execute: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: Properties) -> Self {
        self.config = config;
        self
    }

    pub fn executed_actions(&self) -> Vec<(crate::dns::plan::ChangeAction, String, String)> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.action, r.rtype.as_str().to_string(), r.set.name.clone()))
            .collect()
    }
}

/// Resolver answering from a fixed host table.
#[derive(Default)]
pub struct FakeResolver {
    pub hosts: HashMap<String, Vec<IpAddr>>,
}

impl FakeResolver {
    pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
        self.hosts.insert(
            host.to_string(),
            addrs.iter().map(|a| a.parse().unwrap()).collect(),
        );
        self
    }
}

#[async_trait]
impl HostResolver for FakeResolver {
    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>> {
        match self.hosts.get(host) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs.clone()),
            _ => anyhow::bail!("no such host '{host}'"),
        }
    }
}

/// Feedback handler recording its invocations.
#[derive(Default)]
pub struct RecordingDone {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl DoneHandler for RecordingDone {
    async fn succeeded(&self) {
        self.calls.lock().unwrap().push("succeeded".to_string());
    }
    async fn failed(&self, err: &str) {
        self.calls.lock().unwrap().push(format!("failed: {err}"));
    }
    async fn invalid(&self, err: &str) {
        self.calls.lock().unwrap().push(format!("invalid: {err}"));
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn config(&self) -> &Properties {
        &self.config
    }

    fn domains(&self) -> BTreeSet<String> {
        self.zones.iter().cloned().collect()
    }

    fn match_name(&self, dns: &str) -> Option<(String, usize)> {
        let mut best: Option<(String, usize)> = None;
        for zone in &self.zones {
            let matched = dns == zone || dns.ends_with(&format!(".{zone}"));
            if matched && best.as_ref().is_none_or(|(_, n)| zone.len() > *n) {
                best = Some((zone.clone(), zone.len()));
            }
        }
        best
    }

    async fn get_dns_sets(&self) -> Result<DnsSets> {
        Ok(self.sets.lock().unwrap().clone())
    }

    async fn execute_requests(&self, requests: &[ChangeRequest]) -> Result<()> {
        if let Some(err) = self.fail_execute.lock().unwrap().clone() {
            for request in requests {
                request.failed(&err).await;
            }
            anyhow::bail!(err);
        }
        for request in requests {
            self.executed.lock().unwrap().push(request.clone());
            request.succeeded().await;
        }
        Ok(())
    }
}
