// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNSProvider reconciler: registry lifecycle for provider resources.
//!
//! Reconciling a provider evaluates and normalizes its scope, protects the
//! credential secret with a finalizer, and registers a provider instance
//! built from the referenced secret. Hot reconfiguration detects type and
//! credential changes: a type change tears the old registration down
//! (including its owned record sets), a credential change rebuilds the
//! instance, and an unchanged config merely reattaches the access control.
//!
//! Deletion runs the registration's owned record sets through a throwaway
//! model (which garbage collects them), then releases the provider and
//! secret finalizers.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{ObjectKey, WatchCache};
use crate::constants::MISSING_LB_RETRY_SECS;
use crate::context::Context;
use crate::crd::{DNSProvider, STATE_ACTIVE, STATE_ERROR, STATE_INVALID};
use crate::dns::model::Model;
use crate::dns::provider::{eval_scope, DnsProvider, Properties, Registration};
use crate::dns_errors::{classify_kube_error, ControllerError};
use crate::labels::{FINALIZER_PROVIDER, FINALIZER_SECRET};
use crate::reconcilers::finalizers::{ensure_finalizer, has_finalizer, remove_finalizer};
use crate::reconcilers::modify::update_provider_status;
use crate::reconcilers::{ReconcileStatus, Reconciler};

/// The provider controller.
pub struct ProviderReconciler {
    ctx: Arc<Context>,
    cache: WatchCache<DNSProvider>,
}

impl ProviderReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>, cache: WatchCache<DNSProvider>) -> Self {
        Self { ctx, cache }
    }

    fn api(&self, namespace: &str) -> Api<DNSProvider> {
        Api::namespaced(self.ctx.target_client.clone(), namespace)
    }

    async fn set_status(
        &self,
        provider: &DNSProvider,
        state: &str,
        message: Option<&str>,
    ) {
        let namespace = provider.namespace().unwrap_or_default();
        if let Err(err) =
            update_provider_status(&self.api(&namespace), provider, state, message).await
        {
            warn!(
                "cannot update status of provider {namespace}/{}: {err}",
                provider.name_any()
            );
        }
    }

    async fn get_secret(
        &self,
        provider: &DNSProvider,
    ) -> Result<Option<Secret>, ControllerError> {
        let Some(secret_ref) = &provider.spec.secret_ref else {
            return Ok(None);
        };
        let name = secret_ref.name.clone().unwrap_or_default();
        if name.is_empty() {
            return Ok(None);
        }
        let namespace = secret_ref
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| provider.namespace())
            .unwrap_or_default();
        let api: Api<Secret> = Api::namespaced(self.ctx.target_client.clone(), &namespace);
        match api.get(&name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(err) => Err(classify_kube_error(&err)),
        }
    }

    /// Secret data as string properties, adding the secret finalizer on the
    /// way.
    async fn get_config(&self, provider: &DNSProvider) -> Result<Properties, ControllerError> {
        let mut config = Properties::new();
        let Some(secret) = self.get_secret(provider).await? else {
            return Ok(config);
        };
        if !has_finalizer(&secret, FINALIZER_SECRET) {
            ensure_finalizer(&self.ctx.target_client, &secret, FINALIZER_SECRET)
                .await
                .map_err(|err| ControllerError::Transient(err.to_string()))?;
        }
        if let Some(data) = &secret.data {
            for (key, value) in data {
                config.insert(key.clone(), String::from_utf8_lossy(&value.0).to_string());
            }
        }
        Ok(config)
    }

    async fn build_provider(
        &self,
        provider: &DNSProvider,
        name: &str,
    ) -> anyhow::Result<Arc<dyn DnsProvider>> {
        let type_name = provider.spec.r#type.as_str();
        if type_name.is_empty() {
            anyhow::bail!("type field missing for provider {name}");
        }
        let factory = self
            .ctx
            .provider_types
            .get(type_name)
            .ok_or_else(|| anyhow::anyhow!("unknown provider type '{type_name}' for {name}"))?;
        let config = self
            .get_config(provider)
            .await
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        factory
            .create(name, config, self.ctx.options.dry_run)
            .await
    }

    /// Delete every record set owned by `registration` through a throwaway
    /// model restricted to that registration.
    async fn delete_registration(&self, registration: &Arc<Registration>) -> anyhow::Result<()> {
        let mut model = Model::new(
            self.ctx.registry.clone(),
            self.ctx.resolver.clone(),
            &self.ctx.options.identity,
            self.ctx.options.ttl,
        );
        model.reset_for(vec![registration.clone()]);
        model.update().await
    }

    async fn handle_reconcile(&self, provider: &DNSProvider, name: &str) -> ReconcileStatus {
        let namespace = provider.namespace().unwrap_or_default();

        // scope evaluation with write-back of the normalized form
        let mut scope = provider.spec.scope.clone();
        let (access, scope_modified) = eval_scope(&namespace, &mut scope);
        if scope_modified {
            info!("adapt scope for provider {name}");
            let patch = serde_json::json!({ "spec": { "scope": scope } });
            if let Err(err) = self
                .api(&namespace)
                .patch(&provider.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                return ReconcileStatus::delay(format!("cannot update provider {name}: {err}"));
            }
        }

        if let Err(err) =
            ensure_finalizer(&self.ctx.target_client, provider, FINALIZER_PROVIDER).await
        {
            return ReconcileStatus::delay(err.to_string());
        }

        let type_name = provider.spec.r#type.clone();
        if type_name.is_empty() {
            let message = format!("type field missing for provider {name}");
            self.set_status(provider, STATE_INVALID, Some(&message)).await;
            return ReconcileStatus::failed(message);
        }
        if self.ctx.provider_types.get(&type_name).is_none() {
            let message = format!("unknown provider type '{type_name}' for {name}");
            self.set_status(provider, STATE_INVALID, Some(&message)).await;
            return ReconcileStatus::failed(message);
        }

        let config = match self.get_config(provider).await {
            Ok(config) => config,
            Err(err) if err.is_not_found() => {
                let message = format!("cannot get secret for provider {name}: {err}");
                self.set_status(provider, STATE_ERROR, Some(&message)).await;
                return ReconcileStatus::failed_after(
                    message,
                    Duration::from_secs(MISSING_LB_RETRY_SECS),
                );
            }
            Err(err) => return ReconcileStatus::delay(err.to_string()),
        };

        if let Some(existing) = self.ctx.registry.get(name) {
            if existing.type_name() != type_name {
                info!(
                    "replace provider '{name}' for new type '{}'->'{type_name}'",
                    existing.type_name()
                );
                if let Some(old) = self.ctx.registry.unregister(name) {
                    if let Err(err) = self.delete_registration(&old).await {
                        return ReconcileStatus::delay(format!(
                            "cleanup of dns provider failed: {err}"
                        ));
                    }
                }
            } else if existing.config() == config {
                // unchanged: reattach the current access control only
                debug!("provider '{name}' unchanged");
                existing.set_access_control(Some(access));
                self.set_status(provider, STATE_ACTIVE, None).await;
                return ReconcileStatus::succeeded();
            } else {
                info!("detecting config change for provider '{name}'");
                self.ctx.registry.unregister(name);
            }
        }

        let built = match self.build_provider(provider, name).await {
            Ok(built) => built,
            Err(err) => {
                let message = err.to_string();
                self.set_status(provider, STATE_ERROR, Some(&message)).await;
                return ReconcileStatus::failed(message);
            }
        };

        match self.ctx.registry.register(name, built, Some(access)) {
            Ok(_) => {
                info!("register new {type_name} provider '{name}'");
                self.set_status(provider, STATE_ACTIVE, None).await;
                ReconcileStatus::succeeded()
            }
            Err(err) => {
                let message = err.to_string();
                self.set_status(provider, STATE_ERROR, Some(&message)).await;
                ReconcileStatus::failed(message)
            }
        }
    }

    async fn handle_delete(&self, provider: &DNSProvider, name: &str) -> ReconcileStatus {
        if !has_finalizer(provider, FINALIZER_PROVIDER) {
            return ReconcileStatus::succeeded();
        }
        info!("deleting dns provider {name}");

        let registration = match self.ctx.registry.unregister(name) {
            Some(old) => old,
            None => {
                info!("dns provider {name} not yet registered -> fake registration entry");
                match self.build_provider(provider, name).await {
                    Ok(built) => Arc::new(Registration::new(name, built)),
                    Err(err) => {
                        return ReconcileStatus::delay(format!("{err}"));
                    }
                }
            }
        };
        if let Err(err) = self.delete_registration(&registration).await {
            // keep deletion blocked: the owned records still exist
            self.ctx
                .registry
                .register(name, registration.provider(), None)
                .ok();
            return ReconcileStatus::delay(format!("cleanup of dns provider failed: {err}"));
        }

        if let Err(err) =
            remove_finalizer(&self.ctx.target_client, provider, FINALIZER_PROVIDER).await
        {
            return ReconcileStatus::delay(err.to_string());
        }

        match self.get_secret(provider).await {
            Ok(Some(secret)) => {
                if let Err(err) =
                    remove_finalizer(&self.ctx.target_client, &secret, FINALIZER_SECRET).await
                {
                    return ReconcileStatus::delay(err.to_string());
                }
            }
            Ok(None) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return ReconcileStatus::delay(err.to_string()),
        }
        ReconcileStatus::succeeded()
    }
}

#[async_trait]
impl Reconciler<ObjectKey> for ProviderReconciler {
    async fn reconcile(&self, key: &ObjectKey) -> ReconcileStatus {
        let name = key.to_string();
        let Some(provider) = self.cache.get(key) else {
            // resource gone; drop a stale registration if one survived
            if let Some(old) = self.ctx.registry.unregister(&name) {
                if let Err(err) = self.delete_registration(&old).await {
                    warn!("cleanup of vanished provider {name} failed: {err}");
                }
            }
            return ReconcileStatus::succeeded();
        };

        if provider.metadata.deletion_timestamp.is_some() {
            self.handle_delete(&provider, &name).await
        } else {
            self.handle_reconcile(&provider, &name).await
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
