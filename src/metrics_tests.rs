// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `metrics.rs`

#[cfg(test)]
mod tests {
    use crate::metrics::{
        gather_metrics, report_active_endpoint, report_endpoint, report_lb, report_reconcile,
        ENDPOINT_ACTIVE, ENDPOINT_HEALTH, LOADBALANCER_HEALTH,
    };
    use std::time::Duration;

    #[test]
    fn test_report_endpoint_sets_gauges() {
        report_endpoint("app/mylb", "web-service", "10.0.0.5", true);
        assert!(
            (ENDPOINT_HEALTH
                .with_label_values(&["app/mylb", "web-service"])
                .get()
                - 1.0)
                .abs()
                < f64::EPSILON
        );

        report_endpoint("app/mylb", "web-service", "10.0.0.5", false);
        assert!(
            ENDPOINT_HEALTH
                .with_label_values(&["app/mylb", "web-service"])
                .get()
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_report_active_endpoint() {
        report_active_endpoint("app/mylb", "web-service", true);
        assert!(
            (ENDPOINT_ACTIVE
                .with_label_values(&["app/mylb", "web-service"])
                .get()
                - 1.0)
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_report_lb() {
        report_lb("app/otherlb", "other.example.com", false);
        assert!(
            LOADBALANCER_HEALTH
                .with_label_values(&["app/otherlb"])
                .get()
                .abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_gather_exposition_format() {
        report_lb("app/mylb", "svc.example.com", true);
        report_reconcile(Duration::from_secs(30), Duration::from_millis(1500));

        let text = gather_metrics().expect("gather");
        assert!(text.contains("loadbalancer_health"));
        assert!(text.contains("loadbalancer_dnsnames"));
        assert!(text.contains("dns_reconcile_interval 30"));
        assert!(text.contains("dns_reconcile_duration 1.5"));
    }
}
