// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # dnslb - DNS Load Balancer Controller for Kubernetes
//!
//! dnslb realizes user-declared DNS names as resilient, health-filtered
//! DNS records in external DNS providers (currently AWS Route 53). It runs
//! as a set of coupled control loops over two (possibly distinct)
//! clusters: a *source* cluster holding annotated Services and Ingresses,
//! and a *target* cluster holding the `DNSLoadBalancer` custom resources,
//! their endpoint children and provider credentials.
//!
//! ## Control loops
//!
//! - The **endpoint controller** maintains exactly one
//!   `DNSLoadBalancerEndpoint` child per annotated source object, with
//!   cross-cluster ownership tracking and validity deadlines.
//! - The **DNS controller** probes every load balancer and its endpoints
//!   each tick, selects the active set by load balancer type, and
//!   converges the owning provider through an idempotent diff. Ownership
//!   tags embedded in TXT records let multiple controller instances share
//!   a hosted zone.
//! - The **provider controller** registers `DNSProvider` resources with
//!   domain-conflict detection, hot reconfiguration and
//!   finalizer-protected credential secrets.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`cache`] - cached list/watch access with secondary indices
//! - [`scheduler`] - rate-limited deduplicating work queues
//! - [`dns`] - record model, change planning and providers
//! - [`reconcilers`] - the three control loops and shared plumbing
//! - [`healthz`] / [`metrics`] - liveness heartbeats and Prometheus metrics

pub mod cache;
pub mod cli;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dns;
pub mod dns_errors;
pub mod healthz;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod scheduler;
pub mod statelog;
