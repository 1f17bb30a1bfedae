// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory DNS record bundles and their TXT attribute encoding.
//!
//! A [`DnsSet`] groups the record sets for one fully qualified DNS name.
//! Controller metadata travels inside the name's TXT record set as quoted
//! `"key=value"` strings:
//!
//! - `"owner=<identity>"` - which controller instance manages the name.
//!   Record sets without our owner tag are never touched.
//! - `"prefix=<p>"` - the name prefix under which the TXT companion set is
//!   stored at the provider.
//! - `"cnames=<a,b,c>"` - the original CNAME targets when a multi-target
//!   CNAME set had to be expanded to A records.
//!
//! The quoted form is bit-stable for interop with other replicas and is
//! compared byte-for-byte. A legacy bare TXT value without `=` is read as
//! the owner.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::constants::TXT_TTL_SECS;

/// TXT attribute key for the owning controller identity
pub const ATTR_OWNER: &str = "owner";

/// TXT attribute key for the TXT companion name prefix
pub const ATTR_PREFIX: &str = "prefix";

/// TXT attribute key remembering expanded CNAME targets
pub const ATTR_CNAMES: &str = "cnames";

/// Supported DNS record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Cname,
    Txt,
}

impl RecordType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        }
    }

    /// Parse a provider record type; unsupported types return `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(RecordType::A),
            "CNAME" => Some(RecordType::Cname),
            "TXT" => Some(RecordType::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource record value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub value: String,
}

impl Record {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// An ordered list of record values of one type with a shared TTL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSet {
    pub rtype: RecordType,
    pub ttl: i64,
    pub records: Vec<Record>,
}

impl RecordSet {
    #[must_use]
    pub fn new(rtype: RecordType, ttl: i64) -> Self {
        Self {
            rtype,
            ttl,
            records: Vec::new(),
        }
    }

    pub fn add(&mut self, value: impl Into<String>) -> &mut Self {
        self.records.push(Record::new(value));
        self
    }

    /// Record sets match when their value multisets are equal. Order and
    /// TTL are ignored for matching.
    #[must_use]
    pub fn matches(&self, other: &RecordSet) -> bool {
        if self.records.len() != other.records.len() {
            return false;
        }
        let mut counts: HashMap<&str, i32> = HashMap::new();
        for r in &self.records {
            *counts.entry(r.value.as_str()).or_insert(0) += 1;
        }
        for r in &other.records {
            match counts.get_mut(r.value.as_str()) {
                Some(n) => *n -= 1,
                None => return false,
            }
        }
        counts.values().all(|n| *n == 0)
    }

    /// Space-joined record values for log lines.
    #[must_use]
    pub fn record_string(&self) -> String {
        if self.records.is_empty() {
            return "no records".to_string();
        }
        self.records
            .iter()
            .map(|r| r.value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Record sets for one name, keyed by type.
pub type RecordSets = BTreeMap<RecordType, RecordSet>;

/// All record bundles of a provider, keyed by DNS name.
pub type DnsSets = HashMap<String, DnsSet>;

/// Callback invoked per record bundle once its change requests have been
/// executed by the provider (or rejected before submission).
#[async_trait]
pub trait DoneHandler: Send + Sync {
    /// All changes for the bundle were applied.
    async fn succeeded(&self);
    /// Submission failed; the bundle state in the provider is unknown.
    async fn failed(&self, err: &str);
    /// The bundle was rejected before submission (no provider, scope).
    async fn invalid(&self, err: &str);
}

/// Record bundle for one fully qualified DNS name.
#[derive(Clone)]
pub struct DnsSet {
    /// Fully qualified DNS name (no trailing dot)
    pub name: String,
    /// Record sets keyed by type
    pub sets: RecordSets,
    /// Provider-specific zone handle the name falls under
    pub zone: Option<String>,
    /// Feedback handler for change outcomes
    pub done: Option<Arc<dyn DoneHandler>>,
}

impl fmt::Debug for DnsSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsSet")
            .field("name", &self.name)
            .field("sets", &self.sets)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl DnsSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sets: RecordSets::new(),
            zone: None,
            done: None,
        }
    }

    /// Append one record value of `rtype`, creating the record set with
    /// `ttl` when absent.
    pub fn add_record(&mut self, rtype: RecordType, value: impl Into<String>, ttl: i64) {
        self.sets
            .entry(rtype)
            .or_insert_with(|| RecordSet::new(rtype, ttl))
            .add(value);
    }

    /// Read a TXT attribute. A legacy bare value (no `=`) is returned for
    /// `owner`.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<String> {
        let txt = self.sets.get(&RecordType::Txt)?;
        let prefix = format!("\"{name}=");
        for r in &txt.records {
            if let Some(rest) = r.value.strip_prefix(prefix.as_str()) {
                return rest.strip_suffix('"').map(ToString::to_string);
            }
        }
        if name == ATTR_OWNER {
            for r in &txt.records {
                if !r.value.contains('=') {
                    let bare = r.value.trim_matches('"');
                    return Some(bare.to_string());
                }
            }
        }
        None
    }

    /// Write a TXT attribute, upgrading legacy bare owner values in place.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let encoded = format!("\"{name}={value}\"");
        let txt = self.sets.entry(RecordType::Txt).or_insert_with(|| {
            RecordSet::new(RecordType::Txt, TXT_TTL_SECS)
        });
        // rewrite legacy bare values as owner attributes first
        for r in &mut txt.records {
            if !r.value.contains('=') {
                if name == ATTR_OWNER {
                    r.value = encoded;
                    return;
                }
                let bare = r.value.trim_matches('"').to_string();
                r.value = format!("\"{ATTR_OWNER}={bare}\"");
            }
        }
        let prefix = format!("\"{name}=");
        for r in &mut txt.records {
            if r.value.starts_with(prefix.as_str()) {
                r.value = encoded;
                return;
            }
        }
        txt.records.push(Record::new(encoded));
    }

    #[must_use]
    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.get_attr(ATTR_OWNER)
            .is_some_and(|owner| !owner.is_empty() && owner == identity)
    }

    pub fn set_owner(&mut self, identity: &str) {
        self.set_attr(ATTR_OWNER, identity);
    }
}

/// Name under which a record set of `rtype` is stored at the provider.
///
/// TXT companion sets live under the attribute prefix so they cannot
/// collide with a CNAME at the same name; a leading wildcard label stays in
/// front of the prefix.
#[must_use]
pub fn map_to_provider(rtype: RecordType, set: &DnsSet) -> String {
    if rtype == RecordType::Txt {
        if let Some(prefix) = set.get_attr(ATTR_PREFIX).filter(|p| !p.is_empty()) {
            return match set.name.strip_prefix("*.") {
                Some(rest) => format!("*.{prefix}{rest}"),
                None => format!("{prefix}{}", set.name),
            };
        }
    }
    set.name.clone()
}

/// Inverse of [`map_to_provider`] for names read back from the provider.
#[must_use]
pub fn map_from_provider(rtype: RecordType, set: &DnsSet) -> String {
    if rtype == RecordType::Txt {
        if let Some(prefix) = set.get_attr(ATTR_PREFIX).filter(|p| !p.is_empty()) {
            let (wildcard, name) = match set.name.strip_prefix("*.") {
                Some(rest) => ("*.", rest),
                None => ("", set.name.as_str()),
            };
            return match name.strip_prefix(prefix.as_str()) {
                Some(rest) => format!("{wildcard}{rest}"),
                None => format!("{wildcard}{name}"),
            };
        }
    }
    set.name.clone()
}

#[cfg(test)]
#[path = "set_tests.rs"]
mod set_tests;
