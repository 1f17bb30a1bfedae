// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider feedback mapped onto load balancer and endpoint status.
//!
//! One [`DnsDone`] exists per watch and tick. The provider invokes it per
//! record-set change; whichever outcome arrives first wins, later calls are
//! ignored. Outcome mapping:
//!
//! | outcome | LB state | endpoints |
//! |---|---|---|
//! | succeeded, healthy probe | Healthy | healthy -> (true, active?) |
//! | succeeded, unhealthy probe | Unreachable | unhealthy -> (false, false) |
//! | failed | Error, active kept | untouched |
//! | error (active update) | Error, active cleared | untouched |
//! | invalid | Invalid, active cleared | untouched |
//! | pending | Pending, active kept | untouched |

use async_trait::async_trait;
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::crd::{
    DNSLoadBalancer, DNSLoadBalancerEndpoint, LoadBalancerActive, STATE_ACTIVE, STATE_ERROR,
    STATE_HEALTHY, STATE_INACTIVE, STATE_INVALID, STATE_PENDING, STATE_UNREACHABLE,
};
use crate::dns::set::DoneHandler;
use crate::metrics;
use crate::reconcilers::events::{self, TYPE_NORMAL, TYPE_WARNING};
use crate::reconcilers::lb::watch::WatchTarget;
use crate::reconcilers::modify::{update_ep_status, update_lb_status, ActiveUpdate};

#[derive(Default)]
struct DoneState {
    done: bool,
    message: Option<String>,
    healthy: bool,
    healthy_count: usize,
    active: HashMap<String, Arc<DNSLoadBalancerEndpoint>>,
    healthy_eps: HashMap<String, Arc<DNSLoadBalancerEndpoint>>,
    unhealthy_eps: HashMap<String, Arc<DNSLoadBalancerEndpoint>>,
}

/// Feedback handler for one watch.
pub struct DnsDone {
    client: Client,
    lb: Option<Arc<DNSLoadBalancer>>,
    state: Mutex<DoneState>,
}

impl DnsDone {
    #[must_use]
    pub fn new(client: Client, lb: Option<Arc<DNSLoadBalancer>>) -> Self {
        Self {
            client,
            lb,
            state: Mutex::new(DoneState::default()),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().expect("done state poisoned").healthy = healthy;
    }

    pub fn set_message(&self, message: &str) {
        self.state.lock().expect("done state poisoned").message = Some(message.to_string());
    }

    pub fn add_healthy_target(&self, target: &WatchTarget) {
        let mut state = self.state.lock().expect("done state poisoned");
        state.healthy_count += 1;
        if let Some(ep) = &target.endpoint {
            state.healthy_eps.insert(ep.name_any(), ep.clone());
        }
    }

    pub fn add_active_target(&self, target: &WatchTarget) {
        let mut state = self.state.lock().expect("done state poisoned");
        if let Some(ep) = &target.endpoint {
            state.active.insert(ep.name_any(), ep.clone());
        }
    }

    pub fn add_unhealthy_target(&self, target: &WatchTarget) {
        let mut state = self.state.lock().expect("done state poisoned");
        if let Some(ep) = &target.endpoint {
            state.unhealthy_eps.insert(ep.name_any(), ep.clone());
        }
    }

    #[must_use]
    pub fn has_healthy(&self) -> bool {
        self.state.lock().expect("done state poisoned").healthy_count != 0
    }

    /// Current name-level health flag (for tests and logging).
    #[must_use]
    pub fn snapshot_healthy(&self) -> bool {
        self.state.lock().expect("done state poisoned").healthy
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.lock().expect("done state poisoned").done
    }

    /// Take the final snapshot, or `None` when an outcome was already
    /// processed.
    fn complete(&self) -> Option<DoneState> {
        let mut state = self.state.lock().expect("done state poisoned");
        if state.done {
            return None;
        }
        let snapshot = std::mem::take(&mut *state);
        state.done = true;
        Some(snapshot)
    }

    fn lb_api(&self, lb: &DNSLoadBalancer) -> Api<DNSLoadBalancer> {
        Api::namespaced(self.client.clone(), &lb.namespace().unwrap_or_default())
    }

    fn ep_api(&self, ep: &DNSLoadBalancerEndpoint) -> Api<DNSLoadBalancerEndpoint> {
        Api::namespaced(self.client.clone(), &ep.namespace().unwrap_or_default())
    }

    async fn update_lb(
        &self,
        lb: &DNSLoadBalancer,
        state: &str,
        message: Option<&str>,
        active: ActiveUpdate,
    ) {
        if let Err(err) = update_lb_status(&self.lb_api(lb), lb, state, message, active).await {
            warn!(
                "cannot update dns load balancer status for {}/{}: {err}",
                lb.namespace().unwrap_or_default(),
                lb.name_any()
            );
        }
    }

    async fn update_endpoints(&self, lb: &DNSLoadBalancer, snapshot: &DoneState) {
        for (name, ep) in &snapshot.healthy_eps {
            let active = snapshot.active.contains_key(name);
            let state = if active { STATE_ACTIVE } else { STATE_INACTIVE };
            if let Err(err) =
                update_ep_status(&self.ep_api(ep), ep, state, Some(true), None).await
            {
                warn!("cannot update dns endpoint status for {name}: {err}");
            }
            metrics::report_active_endpoint(&lb.name_any(), name, active);
        }
        for (name, ep) in &snapshot.unhealthy_eps {
            if let Err(err) =
                update_ep_status(&self.ep_api(ep), ep, STATE_INACTIVE, Some(false), None).await
            {
                warn!("cannot update dns endpoint status for {name}: {err}");
            }
            metrics::report_active_endpoint(&lb.name_any(), name, false);
        }
    }

    fn active_list(snapshot: &DoneState) -> ActiveUpdate {
        if snapshot.active.is_empty() {
            return ActiveUpdate::Clear;
        }
        let mut list: Vec<LoadBalancerActive> = snapshot
            .active
            .iter()
            .map(|(name, ep)| LoadBalancerActive {
                endpoint: name.clone(),
                ip_address: ep.spec.ip_address.clone(),
                cname: ep.spec.cname.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        ActiveUpdate::Set(list)
    }

    /// Mark the watch failed with `Error` state; `active_update` also
    /// clears the published active list.
    pub async fn error(&self, active_update: bool, err: &str) {
        let Some(snapshot) = self.complete() else { return };
        let Some(lb) = self.lb.clone() else { return };

        let message = match &snapshot.message {
            Some(message) => format!("{message}: {err}"),
            None => err.to_string(),
        };
        events::emit_event(&self.client, lb.as_ref(), TYPE_WARNING, "sync", &message).await;
        let active = if active_update {
            ActiveUpdate::Clear
        } else {
            ActiveUpdate::Keep
        };
        self.update_lb(&lb, STATE_ERROR, Some(&message), active).await;
    }

    /// Mark the watch pending; the active list is preserved.
    pub async fn pending(&self, message: &str) {
        let Some(_snapshot) = self.complete() else { return };
        let Some(lb) = self.lb.clone() else { return };
        self.update_lb(&lb, STATE_PENDING, Some(message), ActiveUpdate::Keep)
            .await;
    }
}

#[async_trait]
impl DoneHandler for DnsDone {
    async fn succeeded(&self) {
        let Some(snapshot) = self.complete() else { return };
        let Some(lb) = self.lb.clone() else { return };

        if let Some(message) = &snapshot.message {
            events::emit_event(&self.client, lb.as_ref(), TYPE_NORMAL, "sync", message).await;
        }

        let state = if snapshot.healthy {
            STATE_HEALTHY
        } else {
            STATE_UNREACHABLE
        };
        let active = Self::active_list(&snapshot);
        self.update_lb(&lb, state, snapshot.message.as_deref(), active)
            .await;
        self.update_endpoints(&lb, &snapshot).await;
    }

    async fn failed(&self, err: &str) {
        self.error(false, err).await;
    }

    async fn invalid(&self, err: &str) {
        let Some(snapshot) = self.complete() else { return };
        let Some(lb) = self.lb.clone() else { return };

        let message = match &snapshot.message {
            Some(message) => format!("{message}: {err}"),
            None => err.to_string(),
        };
        events::emit_event(&self.client, lb.as_ref(), TYPE_WARNING, "sync", &message).await;
        self.update_lb(&lb, STATE_INVALID, Some(&message), ActiveUpdate::Clear)
            .await;
    }
}

#[cfg(test)]
#[path = "feedback_tests.rs"]
mod feedback_tests;
