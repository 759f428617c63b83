#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use kview_core::{LabelSelector, ResourceKind, SelectorError, ShardPlanner};

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn kinds_parse_from_short_names_and_plurals() {
    assert_eq!("po".parse::<ResourceKind>().unwrap(), ResourceKind::Pod);
    assert_eq!("Services".parse::<ResourceKind>().unwrap(), ResourceKind::Service);
    assert_eq!("hpa".parse::<ResourceKind>().unwrap(), ResourceKind::HorizontalPodAutoscaler);
    assert!("gateway".parse::<ResourceKind>().is_err());
    for k in ResourceKind::ALL {
        assert_eq!(k.as_str().parse::<ResourceKind>().unwrap(), k);
    }
}

#[test]
fn kind_list_dedups_and_rejects_unknown() {
    let kinds = ResourceKind::parse_list("pod, svc,,pods,event").unwrap();
    assert_eq!(kinds, vec![ResourceKind::Pod, ResourceKind::Service, ResourceKind::Event]);
    let err = ResourceKind::parse_list("pod,widget").unwrap_err();
    assert_eq!(err.0, "widget");
}

#[test]
fn scope_and_projection_flags() {
    assert!(!ResourceKind::Node.is_namespaced());
    assert!(!ResourceKind::Namespace.is_namespaced());
    assert!(ResourceKind::Pod.is_namespaced());
    assert!(ResourceKind::Event.is_projection());
    assert!(!ResourceKind::ConfigMap.is_projection());
}

#[test]
fn selector_requires_every_pair() {
    let sel: LabelSelector = "app=web, tier==frontend".parse().unwrap();
    assert!(sel.matches(Some(&labels(&[("app", "web"), ("tier", "frontend"), ("extra", "1")]))));
    assert!(!sel.matches(Some(&labels(&[("app", "web")]))));
    assert!(!sel.matches(Some(&labels(&[("app", "web"), ("tier", "backend")]))));
    assert!(!sel.matches(None));
    assert_eq!(sel.to_string(), "app=web,tier=frontend");
}

#[test]
fn empty_selector_matches_everything() {
    let sel: LabelSelector = "".parse().unwrap();
    assert!(sel.is_empty());
    assert!(sel.matches(None));
    assert!(sel.matches(Some(&labels(&[("a", "b")]))));
}

#[test]
fn selector_parse_errors() {
    assert_eq!("app".parse::<LabelSelector>().unwrap_err(), SelectorError::MissingEquals("app".into()));
    assert_eq!("=x".parse::<LabelSelector>().unwrap_err(), SelectorError::EmptyKey("=x".into()));
}

#[test]
fn later_pair_overrides_earlier_key() {
    let sel: LabelSelector = [("app", "a"), ("app", "b")].into_iter().collect();
    assert_eq!(sel.pairs().collect::<Vec<_>>(), vec![("app", "b")]);
}

#[test]
fn shard_planner_is_stable_and_bounded() {
    let p = ShardPlanner::new(8);
    for ns in ["", "default", "kube-system", "prod"] {
        let s = p.shard(ns);
        assert!(s < 8);
        assert_eq!(s, p.shard(ns));
    }
    assert_eq!(ShardPlanner::new(0).buckets(), 1);
    assert_eq!(ShardPlanner::new(1).shard("anything"), 0);
}
