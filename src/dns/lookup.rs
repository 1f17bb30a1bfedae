// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Host resolution behind a seam.
//!
//! The DNS reconciler resolves names twice per tick: the load balancer name
//! probe and CNAME-to-A expansion for multi-target CNAME sets. Both go
//! through [`HostResolver`] so tests can substitute fixed answers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;

/// Async host-to-address resolution.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host` to its addresses. An unresolvable name is an error.
    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the system configuration (`/etc/resolv.conf`).
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Build a resolver from the system configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the system resolver configuration cannot be
    /// read.
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .context("cannot initialize system resolver")?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup_ips(&self, host: &str) -> Result<Vec<IpAddr>> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .with_context(|| format!("cannot lookup '{host}'"))?;
        Ok(lookup.iter().collect())
    }
}
