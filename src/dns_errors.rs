// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed error taxonomy for reconcilers.
//!
//! Every failure surfaced by a reconciler falls into one of five classes,
//! and each class maps to a fixed queue disposition:
//!
//! - [`ControllerError::Transient`] - API timeouts, provider 5xx, DNS lookup
//!   failures; retried with rate limiting
//! - [`ControllerError::Conflict`] - optimistic concurrency conflicts;
//!   retried immediately
//! - [`ControllerError::Invalid`] - semantic errors surfaced to the user;
//!   reprocessed only after the next resource change
//! - [`ControllerError::NotFound`] - missing referenced objects
//! - [`ControllerError::Fatal`] - wiring errors that abort the process

use thiserror::Error;

/// Classified reconciler error.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    /// Transient infrastructure failure, safe to retry with backoff
    #[error("transient error: {0}")]
    Transient(String),

    /// Concurrent write detected on an optimistic update
    #[error("conflict: {0}")]
    Conflict(String),

    /// Semantic error in a user-provided resource
    #[error("invalid: {0}")]
    Invalid(String),

    /// A referenced object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Unrecoverable startup/wiring failure
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ControllerError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }
}

/// Classify a raw Kubernetes API error into the controller taxonomy.
///
/// - 409 is a [`ControllerError::Conflict`]
/// - 404 is a [`ControllerError::NotFound`]
/// - 429 and 5xx are [`ControllerError::Transient`]
/// - remaining API errors are [`ControllerError::Invalid`]
/// - connection-level failures are [`ControllerError::Transient`]
#[must_use]
pub fn classify_kube_error(err: &kube::Error) -> ControllerError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            409 => ControllerError::Conflict(resp.message.clone()),
            404 => ControllerError::NotFound(resp.message.clone()),
            429 => ControllerError::Transient(resp.message.clone()),
            code if (500..600).contains(&code) => ControllerError::Transient(resp.message.clone()),
            _ => ControllerError::Invalid(resp.message.clone()),
        },
        kube::Error::Service(e) => ControllerError::Transient(e.to_string()),
        other => ControllerError::Transient(other.to_string()),
    }
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
