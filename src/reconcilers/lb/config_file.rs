// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Optional YAML watch-config file.
//!
//! When running without cluster-discovered load balancers, `--watches`
//! names a YAML file declaring watches directly:
//!
//! ```yaml
//! watches:
//!   - name: svc.example.com
//!     healthPath: /healthz
//!     statusCode: 200
//!     singleton: false
//!     targets:
//!       - name: lb-1234.elb.aws
//!       - IP: 10.0.0.5
//! ```
//!
//! File watches carry no load balancer handle, so they produce DNS records
//! and metrics but no status feedback.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::reconcilers::lb::watch::{Watch, WatchTarget};

/// Root of the watch-config file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub watches: Vec<WatchEntry>,
}

/// One declared watch.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEntry {
    /// DNS name to manage
    pub name: String,

    /// Probe path
    #[serde(default)]
    pub health_path: String,

    /// Expected probe status code (default 200)
    #[serde(default)]
    pub status_code: Option<i32>,

    /// Exclusive mode flag
    #[serde(default)]
    pub singleton: Option<bool>,

    /// Candidate targets
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

/// One declared target: a CNAME and/or an IP.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TargetEntry {
    /// CNAME target
    #[serde(default)]
    pub name: Option<String>,

    /// IP target
    #[serde(default, rename = "IP")]
    pub ip: Option<String>,
}

/// Parse a watch-config file.
///
/// # Errors
///
/// Fails when the file cannot be read or is not valid YAML.
pub fn load_watch_config(path: &str) -> Result<WatchConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read watch config '{path}'"))?;
    let config: WatchConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("cannot parse watch config '{path}'"))?;
    Ok(config)
}

impl WatchEntry {
    /// Convert to a [`Watch`] without a load balancer handle.
    #[must_use]
    pub fn into_watch(self) -> Watch {
        let targets = self
            .targets
            .into_iter()
            .map(|target| WatchTarget {
                ip_address: target.ip,
                cname: target.name,
                endpoint: None,
            })
            .filter(WatchTarget::is_valid)
            .collect();
        Watch {
            dns_name: self.name,
            health_path: self.health_path,
            status_code: self.status_code.unwrap_or(0),
            singleton: self.singleton.unwrap_or(false),
            ttl: None,
            namespace: None,
            lb: None,
            targets,
        }
    }
}

#[cfg(test)]
#[path = "config_file_tests.rs"]
mod config_file_tests;
