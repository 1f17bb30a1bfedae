// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cache.rs`

#[cfg(test)]
mod tests {
    use super::super::{ObjectKey, SubIndex, WatchCache};
    use crate::crd::{DNSLoadBalancerEndpoint, DNSLoadBalancerEndpointSpec};
    use kube::runtime::reflector;
    use kube::runtime::watcher;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, RwLock};

    fn endpoint(ns: &str, name: &str, lb: &str) -> DNSLoadBalancerEndpoint {
        let mut ep = DNSLoadBalancerEndpoint::new(
            name,
            DNSLoadBalancerEndpointSpec {
                load_balancer: lb.to_string(),
                ip_address: Some("10.0.0.5".to_string()),
                cname: None,
            },
        );
        ep.metadata.namespace = Some(ns.to_string());
        ep
    }

    fn cache_with(
        objects: Vec<DNSLoadBalancerEndpoint>,
        index: HashMap<String, BTreeSet<ObjectKey>>,
    ) -> WatchCache<DNSLoadBalancerEndpoint> {
        let (reader, mut writer) = reflector::store();
        writer.apply_watcher_event(&watcher::Event::Init);
        for obj in objects {
            writer.apply_watcher_event(&watcher::Event::InitApply(obj));
        }
        writer.apply_watcher_event(&watcher::Event::InitDone);
        // leak the writer so the store stays readable for the test
        std::mem::forget(writer);

        let index: SubIndex = Arc::new(RwLock::new(index));
        WatchCache {
            store: reader,
            index,
        }
    }

    #[test]
    fn test_object_key_parse_and_display() {
        let key = ObjectKey::parse("app/mylb");
        assert_eq!(key.namespace, "app");
        assert_eq!(key.name, "mylb");
        assert_eq!(key.to_string(), "app/mylb");

        let bare = ObjectKey::parse("mylb");
        assert_eq!(bare.namespace, "");
        assert_eq!(bare.name, "mylb");
    }

    #[test]
    fn test_object_key_of() {
        let ep = endpoint("app", "web-service", "mylb");
        let key = ObjectKey::of(&ep);
        assert_eq!(key, ObjectKey::new("app", "web-service"));
    }

    #[test]
    fn test_get_and_list() {
        let cache = cache_with(
            vec![
                endpoint("app", "web-service", "mylb"),
                endpoint("app", "api-service", "mylb"),
            ],
            HashMap::new(),
        );

        assert_eq!(cache.list().len(), 2);
        let found = cache.get(&ObjectKey::new("app", "web-service")).unwrap();
        assert_eq!(found.spec.load_balancer, "mylb");
        assert!(cache.get(&ObjectKey::new("app", "missing")).is_none());
    }

    #[test]
    fn test_by_subkey_resolves_through_store() {
        let mut index = HashMap::new();
        index.insert(
            "app/mylb".to_string(),
            BTreeSet::from([
                ObjectKey::new("app", "web-service"),
                ObjectKey::new("app", "api-service"),
            ]),
        );
        let cache = cache_with(
            vec![
                endpoint("app", "web-service", "mylb"),
                endpoint("app", "api-service", "mylb"),
                endpoint("app", "other", "otherlb"),
            ],
            index,
        );

        let eps = cache.by_subkey("app/mylb");
        assert_eq!(eps.len(), 2);
        assert!(cache.by_subkey("app/unknown").is_empty());
    }
}
