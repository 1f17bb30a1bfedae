// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, annotation and finalizer constants used across all reconcilers.
//!
//! The `source` and `cluster` labels replace Kubernetes owner references for
//! endpoint children whose source object lives in another cluster: owner
//! references cannot cross cluster boundaries, so slave lookup goes through
//! these labels instead.

// ============================================================================
// Annotations
// ============================================================================

/// Annotation on a Service or Ingress naming the `DNSLoadBalancer` it feeds.
///
/// The value is `<name>` or `<namespace>/<name>`.
pub const ANNOTATION_LOAD_BALANCER: &str = "dnslb.firestoned.io/dnsloadbalancer";

// ============================================================================
// Labels and annotations on endpoint children
// ============================================================================

/// Label naming the controller that owns an endpoint child
pub const LABEL_CONTROLLER: &str = "dnslb.firestoned.io/controller";

/// Value of [`LABEL_CONTROLLER`] for endpoints managed by this controller
pub const LABEL_CONTROLLER_VALUE: &str = "dnslb-controller";

/// Annotation recording the source object of an endpoint child as
/// `<kind>:<ns>/<name>`. An annotation rather than a label: label values
/// cannot contain `:` or `/`.
pub const ANNOTATION_SOURCE: &str = "dnslb.firestoned.io/source";

/// Annotation recording the source cluster identity when it differs from
/// the target cluster
pub const ANNOTATION_CLUSTER: &str = "dnslb.firestoned.io/cluster";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer placed on annotated source objects while a slave endpoint exists
pub const FINALIZER_SOURCE: &str = "dnslb.firestoned.io/source-finalizer";

/// Finalizer placed on `DNSProvider` resources while registered
pub const FINALIZER_PROVIDER: &str = "dnslb.firestoned.io/provider-finalizer";

/// Finalizer placed on provider credential secrets while in use
pub const FINALIZER_SECRET: &str = "dnslb.firestoned.io/secret-finalizer";
