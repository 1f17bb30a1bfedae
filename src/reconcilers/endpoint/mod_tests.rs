// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the endpoint reconciler helpers.

#[cfg(test)]
mod tests {
    use crate::cache::ObjectKey;
    use crate::reconcilers::endpoint::sources::{SourceKey, SourceKind};
    use crate::reconcilers::endpoint::{parse_lb_ref, slave_name, update_deadline, SharedUsages};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    #[test]
    fn test_parse_lb_ref_local() {
        assert_eq!(
            parse_lb_ref("app", "mylb"),
            Some(ObjectKey::new("app", "mylb"))
        );
    }

    #[test]
    fn test_parse_lb_ref_qualified() {
        assert_eq!(
            parse_lb_ref("app", "other/mylb"),
            Some(ObjectKey::new("other", "mylb"))
        );
    }

    #[test]
    fn test_parse_lb_ref_invalid() {
        assert_eq!(parse_lb_ref("app", "a/b/c"), None);
        assert_eq!(parse_lb_ref("app", ""), None);
        assert_eq!(parse_lb_ref("app", "/mylb"), None);
        assert_eq!(parse_lb_ref("app", "ns/"), None);
    }

    #[test]
    fn test_slave_name_same_cluster() {
        let key = SourceKey::new(SourceKind::Service, "app", "web");
        assert_eq!(slave_name("", true, &key), "web-service");
    }

    #[test]
    fn test_slave_name_cross_cluster() {
        let key = SourceKey::new(SourceKind::Ingress, "app", "web");
        assert_eq!(slave_name("shoot-1", false, &key), "shoot-1-app-web-ingress");
    }

    #[test]
    fn test_update_deadline_no_interval() {
        let now = Utc::now();
        assert_eq!(update_deadline(None, None, now), None);
        assert_eq!(
            update_deadline(None, Some(now + ChronoDuration::seconds(30)), now),
            None,
            "no interval clears the deadline"
        );
    }

    #[test]
    fn test_update_deadline_initial() {
        let now = Utc::now();
        let deadline = update_deadline(Some(Duration::from_secs(600)), None, now).unwrap();
        assert_eq!((deadline - now).num_seconds(), 600);
    }

    #[test]
    fn test_update_deadline_keeps_fresh_deadline() {
        let now = Utc::now();
        let current = now + ChronoDuration::seconds(500);
        let deadline =
            update_deadline(Some(Duration::from_secs(600)), Some(current), now).unwrap();
        assert_eq!(deadline, current, "residual > 120s keeps the deadline");
    }

    #[test]
    fn test_update_deadline_refreshes_below_threshold() {
        let now = Utc::now();
        let current = now + ChronoDuration::seconds(100);
        let deadline =
            update_deadline(Some(Duration::from_secs(600)), Some(current), now).unwrap();
        assert_eq!(
            (deadline - now).num_seconds(),
            600,
            "residual < 120s advances the deadline by the interval"
        );
    }

    #[test]
    fn test_update_deadline_monotonic() {
        let now = Utc::now();
        let interval = Some(Duration::from_secs(600));

        let first = update_deadline(interval, None, now).unwrap();
        let second = update_deadline(interval, Some(first), now + ChronoDuration::seconds(60))
            .unwrap();
        assert!(second >= first);

        let third = update_deadline(interval, Some(second), now + ChronoDuration::seconds(550))
            .unwrap();
        assert!(third >= second, "refresh never moves the deadline backwards");
    }

    #[test]
    fn test_shared_usages_renew_and_lookup() {
        let usages = SharedUsages::new();
        let web = SourceKey::new(SourceKind::Service, "app", "web");
        let api = SourceKey::new(SourceKind::Service, "app", "api");
        let mylb = ObjectKey::new("app", "mylb");

        usages.renew(&web, &mylb);
        usages.renew(&api, &mylb);
        let mut users = usages.users_of(&mylb);
        users.sort_by(|a, b| a.key.name.cmp(&b.key.name));
        assert_eq!(users, vec![api.clone(), web.clone()]);
    }

    #[test]
    fn test_shared_usages_renew_moves_user() {
        let usages = SharedUsages::new();
        let web = SourceKey::new(SourceKind::Service, "app", "web");
        let mylb = ObjectKey::new("app", "mylb");
        let otherlb = ObjectKey::new("app", "otherlb");

        usages.renew(&web, &mylb);
        usages.renew(&web, &otherlb);
        assert!(usages.users_of(&mylb).is_empty(), "a source uses one LB");
        assert_eq!(usages.users_of(&otherlb), vec![web]);
    }

    #[test]
    fn test_shared_usages_remove_user() {
        let usages = SharedUsages::new();
        let web = SourceKey::new(SourceKind::Service, "app", "web");
        let mylb = ObjectKey::new("app", "mylb");

        usages.renew(&web, &mylb);
        usages.remove_user(&web);
        assert!(usages.users_of(&mylb).is_empty());
    }
}
