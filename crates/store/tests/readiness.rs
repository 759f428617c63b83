#![forbid(unsafe_code)]

use std::time::Duration;

use kview_core::ResourceKind;
use kview_store::{Readiness, ReadinessGate};
use tokio_util::sync::CancellationToken;

#[test]
fn ready_is_the_and_of_gating_kinds() {
    let gate = ReadinessGate::all(&[ResourceKind::Pod, ResourceKind::Service]);
    assert!(!gate.ready());
    assert!(gate.flag(ResourceKind::Pod).unwrap().mark_synced());
    assert!(!gate.ready());
    assert_eq!(gate.pending(), vec![ResourceKind::Service]);
    gate.flag(ResourceKind::Service).unwrap().mark_synced();
    assert!(gate.ready());
}

#[test]
fn sync_state_is_monotonic() {
    let gate = ReadinessGate::all(&[ResourceKind::Pod]);
    let flag = gate.flag(ResourceKind::Pod).unwrap();
    assert!(flag.mark_synced());
    assert!(!flag.mark_synced());
    assert!(flag.is_synced());
    assert!(gate.ready());
    assert_eq!(gate.synced_count(), 1);
}

#[test]
fn non_gating_kinds_are_tracked_but_do_not_block() {
    let gate = ReadinessGate::new(&[ResourceKind::Pod, ResourceKind::Event], &[ResourceKind::Pod, ResourceKind::Node]);
    assert_eq!(gate.gating(), &[ResourceKind::Pod]);
    assert!(gate.is_tracked(ResourceKind::Event));
    assert!(!gate.is_tracked(ResourceKind::Node));
    gate.flag(ResourceKind::Pod).unwrap().mark_synced();
    assert!(gate.ready());
    assert!(!gate.is_synced(ResourceKind::Event));
}

#[tokio::test]
async fn wait_returns_once_all_kinds_sync() {
    let gate = std::sync::Arc::new(ReadinessGate::all(&[ResourceKind::Pod, ResourceKind::Service]));
    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.wait(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    gate.flag(ResourceKind::Service).unwrap().mark_synced();
    gate.flag(ResourceKind::Pod).unwrap().mark_synced();
    let res = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert_eq!(res, Readiness::Ready);
}

#[tokio::test]
async fn wait_returns_cancelled_instead_of_blocking() {
    let gate = ReadinessGate::all(&[ResourceKind::Pod]);
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });
    assert_eq!(gate.wait(&token).await, Readiness::Cancelled);
    assert!(!gate.ready());
}

#[tokio::test]
async fn wait_on_ready_gate_returns_immediately_even_if_cancelled() {
    let gate = ReadinessGate::all(&[ResourceKind::Pod]);
    gate.flag(ResourceKind::Pod).unwrap().mark_synced();
    let token = CancellationToken::new();
    token.cancel();
    assert_eq!(gate.wait(&token).await, Readiness::Ready);
}
