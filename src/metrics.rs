// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the dnslb controller.
//!
//! All metrics are registered in a crate-global registry and exposed via the
//! `/metrics` endpoint when `--port` is set.
//!
//! # Metrics
//!
//! - `endpoint_health{loadbalancer,endpoint}` - probe outcome per endpoint
//! - `endpoint_hosts{loadbalancer,endpoint,host}` - probe outcome per host
//! - `endpoint_active{loadbalancer,endpoint}` - published-set membership
//! - `loadbalancer_health{loadbalancer}` - probe outcome per load balancer
//! - `loadbalancer_dnsnames{loadbalancer,dnsname}` - probe outcome per name
//! - `dns_reconcile_interval` - configured tick interval in seconds
//! - `dns_reconcile_duration` - duration of the last tick in seconds

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Health status of possible endpoints for DNS load balancers
pub static ENDPOINT_HEALTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "endpoint_health",
        "Health status of possible endpoints for DNS load balancers",
    );
    let gauge = GaugeVec::new(opts, &["loadbalancer", "endpoint"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Hostnames for endpoints with health status
pub static ENDPOINT_HOSTS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("endpoint_hosts", "Hostnames for endpoints with health status");
    let gauge = GaugeVec::new(opts, &["loadbalancer", "endpoint", "host"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Active (published) status of endpoints for DNS load balancers
pub static ENDPOINT_ACTIVE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "endpoint_active",
        "Active status of possible endpoints for DNS load balancers",
    );
    let gauge = GaugeVec::new(opts, &["loadbalancer", "endpoint"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Health status of DNS load balancers
pub static LOADBALANCER_HEALTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("loadbalancer_health", "Health status of DNS load balancers");
    let gauge = GaugeVec::new(opts, &["loadbalancer"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// DNS names for load balancers with health status
pub static LOADBALANCER_DNSNAMES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "loadbalancer_dnsnames",
        "DNS names for load balancers with health status",
    );
    let gauge = GaugeVec::new(opts, &["loadbalancer", "dnsname"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Configured DNS reconcile interval in seconds
pub static DNS_RECONCILE_INTERVAL: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "dns_reconcile_interval",
        "Configured DNS reconcile interval in seconds",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Duration of the last DNS reconcile tick in seconds
pub static DNS_RECONCILE_DURATION: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "dns_reconcile_duration",
        "Duration of the last DNS reconcile tick in seconds",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

fn set_bool(gauge: prometheus::Gauge, value: bool) {
    gauge.set(if value { 1.0 } else { 0.0 });
}

/// Report probe health for one endpoint of a load balancer.
pub fn report_endpoint(lb: &str, endpoint: &str, host: &str, healthy: bool) {
    set_bool(ENDPOINT_HEALTH.with_label_values(&[lb, endpoint]), healthy);
    set_bool(ENDPOINT_HOSTS.with_label_values(&[lb, endpoint, host]), healthy);
}

/// Report published-set membership for one endpoint of a load balancer.
pub fn report_active_endpoint(lb: &str, endpoint: &str, active: bool) {
    set_bool(ENDPOINT_ACTIVE.with_label_values(&[lb, endpoint]), active);
}

/// Report probe health for a load balancer and its DNS name.
pub fn report_lb(lb: &str, dnsname: &str, healthy: bool) {
    set_bool(LOADBALANCER_HEALTH.with_label_values(&[lb]), healthy);
    set_bool(LOADBALANCER_DNSNAMES.with_label_values(&[lb, dnsname]), healthy);
}

/// Report tick timing for the DNS reconciler.
pub fn report_reconcile(interval: Duration, duration: Duration) {
    DNS_RECONCILE_INTERVAL.set(interval.as_secs_f64());
    DNS_RECONCILE_DURATION.set(duration.as_secs_f64());
}

/// Render all registered metrics in Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error when encoding fails or the output is not valid UTF-8.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Axum handler for `GET /metrics`.
pub async fn metrics_handler() -> String {
    match gather_metrics() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("failed to gather metrics: {e}");
            String::from("# error gathering metrics\n")
        }
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
