// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cli.rs`

#[cfg(test)]
mod tests {
    use crate::cli::Options;
    use clap::Parser;

    fn parse(args: &[&str]) -> Options {
        let mut argv = vec!["dnslb-controller"];
        argv.extend_from_slice(args);
        Options::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&[]);
        assert_eq!(opts.identity, "GardenRing");
        assert_eq!(opts.ttl, 60);
        assert_eq!(opts.interval, 30);
        assert_eq!(opts.port, 0);
        assert_eq!(opts.providers, "dynamic");
        assert!(!opts.dry_run);
        assert!(!opts.once);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_controller_selection() {
        assert_eq!(parse(&[]).controllers(), vec!["endpoint", "dns", "provider"]);
        assert_eq!(
            parse(&["--controllers", "source"]).controllers(),
            vec!["endpoint"]
        );
        assert_eq!(
            parse(&["--controllers", "target"]).controllers(),
            vec!["dns", "provider"]
        );
        assert_eq!(
            parse(&["--controllers", "dns, endpoint"]).controllers(),
            vec!["dns", "endpoint"]
        );
        assert!(parse(&["--controllers", "dns"]).runs("dns"));
        assert!(!parse(&["--controllers", "dns"]).runs("endpoint"));
    }

    #[test]
    fn test_unknown_controller_rejected() {
        let opts = parse(&["--controllers", "frobnicator"]);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_cluster_requires_targetkube() {
        let opts = parse(&["--cluster", "shoot-1"]);
        assert!(opts.validate().is_err());

        let opts = parse(&["--targetkube", "/tmp/target.kubeconfig"]);
        assert!(opts.validate().is_err());

        let opts = parse(&["--targetkube", "/tmp/target.kubeconfig", "--cluster", "shoot-1"]);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(parse(&["--log-level", "4"]).log_filter().unwrap(), "info");
        assert_eq!(parse(&["--log-level", "5"]).log_filter().unwrap(), "debug");
        assert_eq!(parse(&["--log-level", "0"]).log_filter().unwrap(), "error");
        assert_eq!(parse(&["--log-level", "warn"]).log_filter().unwrap(), "warn");
        assert!(parse(&["--log-level", "7"]).log_filter().is_err());
        assert!(parse(&["--log-level", "loud"]).validate().is_err());
    }

    #[test]
    fn test_bogus_nxdomain_parsing() {
        let opts = parse(&["--bogus-nxdomain", "1.2.3.4"]);
        assert!(opts.validate().is_ok());
        assert_eq!(
            opts.bogus_nxdomain_ip(),
            Some("1.2.3.4".parse().unwrap())
        );

        let opts = parse(&["--bogus-nxdomain", "not-an-ip"]);
        assert!(opts.validate().is_err());

        assert_eq!(parse(&[]).bogus_nxdomain_ip(), None);
    }
}
