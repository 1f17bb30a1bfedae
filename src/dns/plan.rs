// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change planning for provider submissions.
//!
//! Providers receive batches of at most [`MAX_CHANGE_COUNT`] changes. Within
//! a zone every delete is ordered before any create or update, so that an
//! owner moving a record between providers or zones never collides with its
//! own leftover name.

use std::fmt;

use crate::constants::MAX_CHANGE_COUNT;
use crate::dns::set::{DnsSet, RecordType};

/// Kind of change to apply to one record set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One pending change: apply `action` to the `rtype` record set of `set`.
#[derive(Clone, Debug)]
pub struct ChangeRequest {
    pub action: ChangeAction,
    pub rtype: RecordType,
    pub set: DnsSet,
}

impl ChangeRequest {
    #[must_use]
    pub fn new(action: ChangeAction, rtype: RecordType, set: DnsSet) -> Self {
        Self { action, rtype, set }
    }

    /// Report success to the record bundle's feedback handler.
    pub async fn succeeded(&self) {
        if let Some(done) = &self.set.done {
            done.succeeded().await;
        }
    }

    /// Report a submission failure to the record bundle's feedback handler.
    pub async fn failed(&self, err: &str) {
        if let Some(done) = &self.set.done {
            done.failed(err).await;
        }
    }
}

/// Split one zone's change requests into submission batches.
///
/// Deletes are ordered strictly before creates and updates, the relative
/// order within each action class is preserved, and every batch holds at
/// most `max` changes, giving `ceil(n / max)` batches overall.
#[must_use]
pub fn plan_batches(requests: &[ChangeRequest], max: usize) -> Vec<Vec<&ChangeRequest>> {
    let max = max.max(1);
    let ordered: Vec<&ChangeRequest> = requests
        .iter()
        .filter(|r| r.action == ChangeAction::Delete)
        .chain(requests.iter().filter(|r| r.action != ChangeAction::Delete))
        .collect();

    let mut batches = Vec::new();
    for chunk in ordered.chunks(max) {
        batches.push(chunk.to_vec());
    }
    batches
}

/// Split with the default batch size.
#[must_use]
pub fn plan_default_batches(requests: &[ChangeRequest]) -> Vec<Vec<&ChangeRequest>> {
    plan_batches(requests, MAX_CHANGE_COUNT)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
