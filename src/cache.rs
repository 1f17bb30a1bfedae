// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cached, typed list/watch access to one resource type in one cluster.
//!
//! A [`WatchCache`] wraps a `kube` watcher stream with:
//!
//! - a reflector-backed primary index keyed by (namespace, name),
//! - an optional secondary index from a caller-provided sub-key extraction
//!   function (used e.g. to look up endpoints by their load balancer), and
//! - ordered per-key event fanout to registered handlers.
//!
//! On initial sync every existing object is delivered as a synthetic add;
//! after a relist only keys whose resource version differs from the cached
//! object are re-delivered, and objects that vanished while disconnected are
//! delivered as deletes. [`WatchCache::wait_for_sync`] resolves once the
//! first full list has been applied.

use futures::StreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::warn;

/// Namespace/name pair identifying one object within a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key of a live object.
    #[must_use]
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone().unwrap_or_default(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }

    /// Parse `"<namespace>/<name>"` (or a bare name with empty namespace).
    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key.split_once('/') {
            Some((ns, name)) => Self::new(ns, name),
            None => Self::new("", key),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of a cache event delivered to handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEventKind {
    Added,
    Modified,
    Deleted,
}

/// Handler invoked for every cache event, in per-key order.
pub type EventHandler<K> = Arc<dyn Fn(CacheEventKind, &K) + Send + Sync>;

/// Sub-key extraction function for the secondary index.
pub type SubKeyFn<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

type SubIndex = Arc<RwLock<HashMap<String, BTreeSet<ObjectKey>>>>;

/// Builder for a [`WatchCache`].
pub struct CacheBuilder<K>
where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static,
{
    api: Api<K>,
    config: watcher::Config,
    subkey: Option<SubKeyFn<K>>,
    handlers: Vec<EventHandler<K>>,
}

impl<K> CacheBuilder<K>
where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(api: Api<K>) -> Self {
        Self {
            api,
            config: watcher::Config::default(),
            subkey: None,
            handlers: Vec::new(),
        }
    }

    /// Install the secondary index extraction function.
    #[must_use]
    pub fn subkey(mut self, f: impl Fn(&K) -> Vec<String> + Send + Sync + 'static) -> Self {
        self.subkey = Some(Arc::new(f));
        self
    }

    /// Register an event handler. Handlers run on the watch task, in event
    /// order per object key.
    #[must_use]
    pub fn handler(mut self, f: impl Fn(CacheEventKind, &K) + Send + Sync + 'static) -> Self {
        self.handlers.push(Arc::new(f));
        self
    }

    /// Start the watch task and return the cache handle.
    ///
    /// The task stops once `cancel` observes `true`.
    #[must_use]
    pub fn spawn(self, cancel: watch::Receiver<bool>) -> WatchCache<K> {
        let (reader, writer) = reflector::store();
        let index: SubIndex = Arc::new(RwLock::new(HashMap::new()));
        let cache = WatchCache {
            store: reader,
            index: index.clone(),
        };

        let CacheBuilder {
            api,
            config,
            subkey,
            handlers,
        } = self;

        tokio::spawn(run_watch(api, config, writer, index, subkey, handlers, cancel));
        cache
    }
}

async fn run_watch<K>(
    api: Api<K>,
    config: watcher::Config,
    mut writer: reflector::store::Writer<K>,
    index: SubIndex,
    subkey: Option<SubKeyFn<K>>,
    handlers: Vec<EventHandler<K>>,
    mut cancel: watch::Receiver<bool>,
) where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static,
{
    let mut known: HashMap<ObjectKey, K> = HashMap::new();
    let mut seen_in_init: Option<HashSet<ObjectKey>> = None;

    let stream = watcher(api, config).default_backoff();
    futures::pin_mut!(stream);

    loop {
        let event = tokio::select! {
            changed = cancel.changed() => {
                match changed {
                    Ok(()) if !*cancel.borrow() => continue,
                    // cancelled, or the shutdown sender is gone
                    _ => return,
                }
            }
            event = stream.next() => event,
        };
        let Some(event) = event else { return };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!("watch error: {err}");
                continue;
            }
        };
        writer.apply_watcher_event(&event);

        match event {
            watcher::Event::Init => {
                seen_in_init = Some(HashSet::new());
            }
            watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
                let key = ObjectKey::of(&obj);
                if let Some(seen) = seen_in_init.as_mut() {
                    seen.insert(key.clone());
                }
                let previous = known.get(&key);
                let unchanged = previous
                    .is_some_and(|old| old.resource_version() == obj.resource_version());
                if unchanged {
                    continue;
                }
                let kind = if previous.is_some() {
                    CacheEventKind::Modified
                } else {
                    CacheEventKind::Added
                };
                reindex(&index, subkey.as_ref(), &key, previous, Some(&obj));
                known.insert(key, obj.clone());
                for handler in &handlers {
                    handler(kind, &obj);
                }
            }
            watcher::Event::InitDone => {
                let Some(seen) = seen_in_init.take() else { continue };
                let gone: Vec<ObjectKey> = known
                    .keys()
                    .filter(|key| !seen.contains(key))
                    .cloned()
                    .collect();
                for key in gone {
                    if let Some(old) = known.remove(&key) {
                        reindex(&index, subkey.as_ref(), &key, Some(&old), None);
                        for handler in &handlers {
                            handler(CacheEventKind::Deleted, &old);
                        }
                    }
                }
            }
            watcher::Event::Delete(obj) => {
                let key = ObjectKey::of(&obj);
                let previous = known.remove(&key);
                reindex(&index, subkey.as_ref(), &key, previous.as_ref(), None);
                for handler in &handlers {
                    handler(CacheEventKind::Deleted, &obj);
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

fn reindex<K>(
    index: &SubIndex,
    subkey: Option<&SubKeyFn<K>>,
    key: &ObjectKey,
    old: Option<&K>,
    new: Option<&K>,
) {
    let Some(extract) = subkey else { return };
    let mut index = index.write().expect("sub index poisoned");
    if let Some(old) = old {
        for sub in extract(old) {
            if let Some(keys) = index.get_mut(&sub) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&sub);
                }
            }
        }
    }
    if let Some(new) = new {
        for sub in extract(new) {
            index.entry(sub).or_default().insert(key.clone());
        }
    }
}

/// Read handle to a running watch cache.
#[derive(Clone)]
pub struct WatchCache<K>
where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static,
{
    store: Store<K>,
    index: SubIndex,
}

impl<K> WatchCache<K>
where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Look up one object by key.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let mut obj_ref = ObjectRef::<K>::new(&key.name);
        if !key.namespace.is_empty() {
            obj_ref = obj_ref.within(&key.namespace);
        }
        self.store.get(&obj_ref)
    }

    /// All cached objects.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Objects registered under a secondary-index key.
    #[must_use]
    pub fn by_subkey(&self, sub: &str) -> Vec<Arc<K>> {
        let keys: Vec<ObjectKey> = {
            let index = self.index.read().expect("sub index poisoned");
            index
                .get(sub)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        };
        keys.iter().filter_map(|key| self.get(key)).collect()
    }

    /// Resolve once the initial list has been applied.
    pub async fn wait_for_sync(&self) {
        if let Err(err) = self.store.wait_until_ready().await {
            warn!("watch cache writer dropped before sync: {err}");
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
