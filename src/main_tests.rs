// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs`

#[cfg(test)]
mod tests {
    use super::super::relevant_source;
    use dnslb::cache::CacheEventKind;
    use dnslb::labels::{ANNOTATION_LOAD_BALANCER, FINALIZER_SOURCE};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    #[test]
    fn test_annotated_source_is_relevant() {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_LOAD_BALANCER.to_string(), "mylb".to_string());
        assert!(relevant_source(
            CacheEventKind::Added,
            &annotations,
            &ObjectMeta::default()
        ));
    }

    #[test]
    fn test_finalized_source_is_relevant() {
        let meta = ObjectMeta {
            finalizers: Some(vec![FINALIZER_SOURCE.to_string()]),
            ..Default::default()
        };
        assert!(relevant_source(
            CacheEventKind::Modified,
            &BTreeMap::new(),
            &meta
        ));
    }

    #[test]
    fn test_plain_source_is_not_relevant() {
        assert!(!relevant_source(
            CacheEventKind::Added,
            &BTreeMap::new(),
            &ObjectMeta::default()
        ));
    }
}
