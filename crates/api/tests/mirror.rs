use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Event, Namespace, ObjectReference, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kview_api::{LabelSelector, Mirror, MirrorConfig, QueryError, Readiness, ResourceKind, SyncError};
use kview_core::Notification;
use kview_store::mock::{ScriptedSource, ScriptedSources};
use tokio_util::sync::CancellationToken;

fn meta(ns: Option<&str>, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: ns.map(str::to_string),
        labels: (!labels.is_empty())
            .then(|| labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>()),
        ..Default::default()
    }
}

fn pod(ns: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod { metadata: meta(Some(ns), name, labels), ..Default::default() }
}

fn namespace(name: &str) -> Namespace {
    Namespace { metadata: meta(None, name, &[]), ..Default::default() }
}

fn event(ns: &str, name: &str, target: &str, msg: &str) -> Event {
    Event {
        metadata: meta(Some(ns), name, &[]),
        involved_object: ObjectReference {
            kind: Some("Pod".to_string()),
            name: Some(target.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        },
        message: Some(msg.to_string()),
        ..Default::default()
    }
}

fn config(kinds: &[ResourceKind]) -> MirrorConfig {
    MirrorConfig { kinds: kinds.to_vec(), ..Default::default() }
}

async fn wait_ready(mirror: &Mirror) -> Readiness {
    let token = CancellationToken::new();
    tokio::time::timeout(Duration::from_secs(5), mirror.wait(&token)).await.unwrap()
}

fn names<K: Resource>(items: &[std::sync::Arc<K>]) -> Vec<String> {
    items.iter().map(|o| o.meta().name.clone().unwrap_or_default()).collect()
}

#[tokio::test]
async fn bulk_load_is_visible_through_the_facade() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let sources = ScriptedSources::new();
    sources.insert(ScriptedSource::new(vec![pod("ns1", "a", &[]), pod("ns1", "b", &[])]).0);
    let token = CancellationToken::new();
    let _running = mirror.start(&sources, token.clone());

    assert_eq!(wait_ready(&mirror).await, Readiness::Ready);
    let q = mirror.query();
    assert_eq!(names(&q.list_by_namespace::<Pod>("ns1").unwrap()), vec!["a", "b"]);
    assert!(q.get_by_name::<Pod>("ns1", "a").unwrap().is_some());
    assert!(q.get_by_name::<Pod>("ns1", "zzz").unwrap().is_none());
    assert!(q.list_by_namespace::<Pod>("other").unwrap().is_empty());
    token.cancel();
}

#[tokio::test]
async fn queries_before_sync_are_unsynced_not_empty() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let source = ScriptedSource::<Pod>::idle();
    let release = source.hold_list();
    let sources = ScriptedSources::new();
    sources.insert(source);
    let token = CancellationToken::new();
    let _running = mirror.start(&sources, token.clone());

    let q = mirror.query();
    assert_eq!(q.list_by_namespace::<Pod>("ns1").unwrap_err(), QueryError::Unsynced(ResourceKind::Pod));
    assert_eq!(q.get_by_name::<Pod>("ns1", "a").unwrap_err(), QueryError::Unsynced(ResourceKind::Pod));
    assert!(!mirror.ready());

    release.send(()).unwrap();
    assert_eq!(wait_ready(&mirror).await, Readiness::Ready);
    assert_eq!(q.list_by_namespace::<Pod>("ns1").unwrap(), Vec::new());
    token.cancel();
}

#[tokio::test]
async fn untracked_kind_is_reported() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let q = mirror.query();
    assert_eq!(q.list_by_namespace::<Service>("ns1").unwrap_err(), QueryError::NotTracked(ResourceKind::Service));
}

#[tokio::test]
async fn failed_kind_does_not_stop_the_others() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod, ResourceKind::ConfigMap])).unwrap();
    let sources = ScriptedSources::new();
    sources.insert(ScriptedSource::<ConfigMap>::failing("forbidden"));
    let (pods, _pod_events) = ScriptedSource::new(vec![pod("ns1", "a", &[])]);
    sources.insert(pods);
    let token = CancellationToken::new();
    let mut running = mirror.start(&sources, token.clone());
    assert_eq!(running.len(), 2);

    let (kind, outcome) = running.next_exit().await.unwrap();
    assert_eq!(kind, ResourceKind::ConfigMap);
    assert!(matches!(outcome, Err(SyncError::List { .. })));

    while !mirror.gate().is_synced(ResourceKind::Pod) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let q = mirror.query();
    assert_eq!(names(&q.list_by_namespace::<Pod>("ns1").unwrap()), vec!["a"]);
    assert!(!mirror.ready());
    assert_eq!(mirror.gate().pending(), vec![ResourceKind::ConfigMap]);

    token.cancel();
    let rest = running.join().await;
    assert_eq!(rest.len(), 1);
    assert!(matches!(rest[0], (ResourceKind::Pod, Ok(()))));
}

#[tokio::test]
async fn gate_subset_ignores_non_gating_kinds() {
    let cfg = MirrorConfig { gate: Some(vec![ResourceKind::Pod]), ..config(&[ResourceKind::Pod, ResourceKind::ConfigMap]) };
    let mirror = Mirror::new(cfg).unwrap();
    let sources = ScriptedSources::new();
    sources.insert(ScriptedSource::<ConfigMap>::failing("boom"));
    let token = CancellationToken::new();
    let _running = mirror.start(&sources, token.clone());

    assert_eq!(wait_ready(&mirror).await, Readiness::Ready);
    assert_eq!(
        mirror.query().list_by_namespace::<ConfigMap>("ns1").unwrap_err(),
        QueryError::Unsynced(ResourceKind::ConfigMap)
    );
    token.cancel();
}

#[tokio::test]
async fn label_filter_requires_every_pair() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let sources = ScriptedSources::new();
    sources.insert(
        ScriptedSource::new(vec![
            pod("ns1", "web", &[("app", "web"), ("tier", "fe")]),
            pod("ns1", "web-canary", &[("app", "web")]),
            pod("ns1", "bare", &[]),
        ])
        .0,
    );
    let token = CancellationToken::new();
    let _running = mirror.start(&sources, token.clone());
    wait_ready(&mirror).await;

    let q = mirror.query();
    let both: LabelSelector = "app=web,tier=fe".parse().unwrap();
    assert_eq!(names(&q.filter_by_label::<Pod>("ns1", &both).unwrap()), vec!["web"]);
    let app: LabelSelector = "app=web".parse().unwrap();
    assert_eq!(names(&q.filter_by_label::<Pod>("ns1", &app).unwrap()), vec!["web", "web-canary"]);
    assert_eq!(q.filter_by_label::<Pod>("ns1", &LabelSelector::new()).unwrap().len(), 3);
    token.cancel();
}

#[tokio::test]
async fn latest_event_message_defaults_to_empty() {
    let mirror = Mirror::new(config(&[ResourceKind::Event])).unwrap();
    let (source, tx) = ScriptedSource::new(vec![event("ns1", "e1", "a", "Scheduled")]);
    let sources = ScriptedSources::new();
    sources.insert(source);
    let token = CancellationToken::new();
    let mut running = mirror.start(&sources, token.clone());
    tx.send(Notification::Added(event("ns1", "e2", "a", "Pulled image"))).unwrap();
    drop(tx);
    assert!(matches!(running.next_exit().await, Some((ResourceKind::Event, Ok(())))));

    let q = mirror.query();
    assert_eq!(q.latest_event_message("ns1", "Pod", "a"), "Pulled image");
    assert_eq!(q.latest_event_message("ns1", "Pod", "missing"), "");
}

#[tokio::test]
async fn namespaces_and_counts() {
    let mirror = Mirror::new(config(&[ResourceKind::Namespace, ResourceKind::Pod])).unwrap();
    let sources = ScriptedSources::new();
    sources.insert(ScriptedSource::new(vec![namespace("kube-system"), namespace("default")]).0);
    sources.insert(ScriptedSource::new(vec![pod("default", "a", &[]), pod("kube-system", "dns", &[])]).0);
    let token = CancellationToken::new();
    let _running = mirror.start(&sources, token.clone());
    wait_ready(&mirror).await;

    let q = mirror.query();
    assert_eq!(q.namespaces().unwrap(), vec!["default", "kube-system"]);
    assert_eq!(q.counts(), vec![(ResourceKind::Namespace, 2), (ResourceKind::Pod, 2)]);
    assert_eq!(q.list_all::<Pod>().unwrap().len(), 2);
    token.cancel();
}

#[tokio::test]
async fn wait_returns_cancelled_when_token_fires() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let source = ScriptedSource::<Pod>::idle();
    let _release = source.hold_list();
    let sources = ScriptedSources::new();
    sources.insert(source);
    let run_token = CancellationToken::new();
    let _running = mirror.start(&sources, run_token.clone());

    let wait_token = CancellationToken::new();
    let canceller = wait_token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    assert_eq!(mirror.wait(&wait_token).await, Readiness::Cancelled);
    run_token.cancel();
}

#[tokio::test]
async fn second_start_is_refused() {
    let mirror = Mirror::new(config(&[ResourceKind::Pod])).unwrap();
    let token = CancellationToken::new();
    let first = mirror.start(&ScriptedSources::new(), token.clone());
    let second = mirror.start(&ScriptedSources::new(), token.clone());
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    token.cancel();
    let exits = first.join().await;
    assert!(matches!(exits[..], [(ResourceKind::Pod, Ok(()))]));
}
