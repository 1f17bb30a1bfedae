// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line options for the dnslb controller.
//!
//! `--log-level` accepts either a level name or a numeric logrus-style level
//! (0-5) for compatibility with existing deployments.

use anyhow::{bail, Result};
use clap::Parser;

use crate::constants::{DEFAULT_IDENTITY, DEFAULT_INTERVAL_SECS, DEFAULT_TTL_SECS};

/// Controllers running against the source cluster
pub const SOURCE_CONTROLLERS: &[&str] = &["endpoint"];

/// Controllers running against the target cluster
pub const TARGET_CONTROLLERS: &[&str] = &["dns", "provider"];

/// DNS load-balancer controller manager.
#[derive(Parser, Clone, Debug)]
#[command(name = "dnslb-controller", version, about)]
pub struct Options {
    /// Path to the kubeconfig for the source cluster (empty: in-cluster)
    #[arg(long, default_value = "")]
    pub kubeconfig: String,

    /// Path to the kubeconfig for the target cluster (empty: same as source)
    #[arg(long = "targetkube", default_value = "")]
    pub targetkube: String,

    /// Identity of the local cluster when running against two clusters
    #[arg(long, default_value = "")]
    pub cluster: String,

    /// Path to a YAML watch-config file for cluster-less watches
    #[arg(long)]
    pub watches: Option<String>,

    /// Controller identity written into TXT ownership tags
    #[arg(long, default_value = DEFAULT_IDENTITY)]
    pub identity: String,

    /// Controllers to run: "all", "source", "target" or a comma-separated list
    #[arg(long, default_value = "all")]
    pub controllers: String,

    /// Default TTL in seconds for published DNS records
    #[arg(long, default_value_t = DEFAULT_TTL_SECS)]
    pub ttl: i64,

    /// Provider mode: "dynamic", "static", "all" or a provider type name
    #[arg(long, default_value = "dynamic")]
    pub providers: String,

    /// Run duration in seconds (0 = forever)
    #[arg(long, default_value_t = 0)]
    pub duration: u64,

    /// Log provider changes instead of submitting them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Run a single DNS reconcile tick and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Log level: error|warn|info|debug|trace or 0-5
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// DNS reconcile interval in seconds
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u64,

    /// Port for the /healthz and /metrics HTTP server (0 = disabled)
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Directory with provider plugins (accepted for compatibility, unused)
    #[arg(long, default_value = "")]
    pub plugin_dir: String,

    /// IP address some resolvers substitute for unknown names; lookups
    /// returning it are treated as unresolved
    #[arg(long, default_value = "")]
    pub bogus_nxdomain: String,
}

impl Options {
    /// Resolve the `--controllers` selector to concrete controller names.
    #[must_use]
    pub fn controllers(&self) -> Vec<String> {
        let all = || {
            SOURCE_CONTROLLERS
                .iter()
                .chain(TARGET_CONTROLLERS.iter())
                .map(|c| (*c).to_string())
                .collect()
        };
        match self.controllers.as_str() {
            "all" => all(),
            "source" => SOURCE_CONTROLLERS.iter().map(|c| (*c).to_string()).collect(),
            "target" => TARGET_CONTROLLERS.iter().map(|c| (*c).to_string()).collect(),
            list => list
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Whether the named controller is enabled.
    #[must_use]
    pub fn runs(&self, controller: &str) -> bool {
        self.controllers().iter().any(|c| c == controller)
    }

    /// Validate option combinations.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown controller name, an invalid log
    /// level, or an inconsistent cluster/targetkube combination.
    pub fn validate(&self) -> Result<()> {
        if self.targetkube.is_empty() && !self.cluster.is_empty() {
            bail!("cluster identity not possible when not using a separate target cluster");
        }
        if !self.targetkube.is_empty() && self.cluster.is_empty() {
            bail!("cluster identity (for local cluster) required when using a separate target cluster");
        }
        for c in self.controllers() {
            if !SOURCE_CONTROLLERS.contains(&c.as_str()) && !TARGET_CONTROLLERS.contains(&c.as_str())
            {
                bail!("unknown controller '{c}'");
            }
        }
        self.log_filter()?;
        if !self.bogus_nxdomain.is_empty() && self.bogus_nxdomain.parse::<std::net::IpAddr>().is_err()
        {
            bail!("invalid ip address '{}' for --bogus-nxdomain", self.bogus_nxdomain);
        }
        Ok(())
    }

    /// Parsed bogus-NXDOMAIN sentinel address.
    #[must_use]
    pub fn bogus_nxdomain_ip(&self) -> Option<std::net::IpAddr> {
        if self.bogus_nxdomain.is_empty() {
            return None;
        }
        self.bogus_nxdomain.parse().ok()
    }

    /// Translate `--log-level` to a tracing filter directive.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is neither a level name nor 0-5.
    pub fn log_filter(&self) -> Result<&'static str> {
        match self.log_level.to_lowercase().as_str() {
            // numeric values follow logrus levels
            "0" | "1" | "2" | "error" => Ok("error"),
            "3" | "warn" | "warning" => Ok("warn"),
            "4" | "info" => Ok("info"),
            "5" | "debug" => Ok("debug"),
            "trace" => Ok("trace"),
            other => bail!("log level must be a level name or in the range 0-5, got '{other}'"),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod cli_tests;
