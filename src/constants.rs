// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the dnslb controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all dnslb CRDs
pub const API_GROUP: &str = "dnslb.firestoned.io";

/// API version for all dnslb CRDs
pub const API_VERSION: &str = "v1beta1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "dnslb.firestoned.io/v1beta1";

/// Kind name for `DNSLoadBalancer` resource
pub const KIND_LOAD_BALANCER: &str = "DNSLoadBalancer";

/// Kind name for `DNSLoadBalancerEndpoint` resource
pub const KIND_ENDPOINT: &str = "DNSLoadBalancerEndpoint";

/// Kind name for `DNSProvider` resource
pub const KIND_PROVIDER: &str = "DNSProvider";

// ============================================================================
// Controller Defaults
// ============================================================================

/// Default controller identity written into TXT ownership tags
pub const DEFAULT_IDENTITY: &str = "GardenRing";

/// Default TTL for published DNS records (seconds)
pub const DEFAULT_TTL_SECS: i64 = 60;

/// TTL used for TXT metadata record sets (seconds)
pub const TXT_TTL_SECS: i64 = 600;

/// Default DNS reconcile interval (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Default expected HTTP status code for health probes
pub const DEFAULT_STATUS_CODE: i32 = 200;

/// Prefix prepended to DNS names for companion TXT record sets
pub const TXT_RECORD_PREFIX: &str = "comment-";

/// Health probe request timeout
pub const PROBE_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Endpoint Lifecycle Constants
// ============================================================================

/// Reschedule interval after a successful source reconcile (refreshes the
/// endpoint validity deadline)
pub const ENDPOINT_RESYNC_SECS: u64 = 60;

/// An endpoint validity deadline is only refreshed when the residual
/// lifetime drops below this threshold
pub const VALIDITY_REFRESH_THRESHOLD_SECS: i64 = 120;

/// Retry interval when an annotated source references a missing load balancer
pub const MISSING_LB_RETRY_SECS: u64 = 600;

/// Expired endpoints are only garbage collected once the DNS reconciler has
/// been running this long, to avoid racing a late source-cluster sync
pub const CLEANUP_GRACE_SECS: u64 = 180;

// ============================================================================
// Worker Pool Constants
// ============================================================================

/// Parallel workers for the endpoint controller
pub const ENDPOINT_WORKERS: usize = 3;

/// Parallel workers for the DNS controller
pub const DNS_WORKERS: usize = 2;

/// Parallel workers for the provider controller
pub const PROVIDER_WORKERS: usize = 2;

/// Workers must drain their current item within this deadline on shutdown
pub const SHUTDOWN_DEADLINE_SECS: u64 = 120;

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Change Planning Constants
// ============================================================================

/// Maximum number of record changes submitted to a provider in one batch
pub const MAX_CHANGE_COUNT: usize = 20;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

/// Lease name used for leader election
pub const LEASE_NAME: &str = "dnslb-leader";

// ============================================================================
// Health Reporter Constants
// ============================================================================

/// Extra slack added on top of `2 * interval` for heartbeat timeouts
pub const HEARTBEAT_SLACK_SECS: u64 = 120;

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Bind address for the metrics/health HTTP server
pub const HTTP_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

/// Path for the Prometheus metrics endpoint
pub const METRICS_PATH: &str = "/metrics";

/// Path for the health endpoint
pub const HEALTHZ_PATH: &str = "/healthz";
