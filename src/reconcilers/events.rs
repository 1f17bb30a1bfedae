// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes event emission for reconciled resources.

use anyhow::Result;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

/// Component name reported as the event source
const COMPONENT: &str = "dnslb-controller";

/// Event type for normal operational events
pub const TYPE_NORMAL: &str = "Normal";

/// Event type for warnings
pub const TYPE_WARNING: &str = "Warning";

/// Emit an event for `resource`. Failures are logged, never propagated;
/// events are best-effort.
pub async fn emit_event<T>(
    client: &Client,
    resource: &T,
    event_type: &str,
    reason: &str,
    message: &str,
) where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    if let Err(err) = try_emit_event(client, resource, event_type, reason, message).await {
        warn!(
            "cannot emit event for {}/{}: {err}",
            resource.namespace().unwrap_or_default(),
            resource.name_any()
        );
    }
}

async fn try_emit_event<T>(
    client: &Client,
    resource: &T,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Result<()>
where
    T: Resource<DynamicType = ()> + ResourceExt,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let now = Utc::now();

    let event = Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}.")),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(T::api_version(&()).to_string()),
            kind: Some(T::kind(&()).to_string()),
            name: Some(name),
            namespace: Some(namespace.clone()),
            uid: resource.meta().uid.clone(),
            resource_version: resource.meta().resource_version.clone(),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        count: Some(1),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        event_time: Some(MicroTime(now)),
        reporting_component: Some(COMPONENT.to_string()),
        source: Some(EventSource {
            component: Some(COMPONENT.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let api: Api<Event> = Api::namespaced(client.clone(), &namespace);
    api.create(&PostParams::default(), &event).await?;
    Ok(())
}
