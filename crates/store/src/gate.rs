//! Readiness gate over per-kind initial sync flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use kview_core::ResourceKind;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of [`ReadinessGate::wait`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Cancelled,
}

/// Write side of one kind's sync state. Flips false -> true once and never back.
#[derive(Clone)]
pub struct SyncFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl SyncFlag {
    pub fn is_synced(&self) -> bool { *self.tx.borrow() }

    /// Returns true if this call performed the transition.
    pub fn mark_synced(&self) -> bool {
        self.tx.send_if_modified(|synced| {
            if *synced { return false; }
            *synced = true;
            true
        })
    }
}

/// Tracks sync state for every tracked kind and reports readiness over the
/// gating subset.
pub struct ReadinessGate {
    flags: BTreeMap<ResourceKind, SyncFlag>,
    gating: Vec<ResourceKind>,
}

impl ReadinessGate {
    /// `gating` must be a subset of `tracked`; kinds outside `tracked` are ignored.
    pub fn new(tracked: &[ResourceKind], gating: &[ResourceKind]) -> Self {
        let flags: BTreeMap<ResourceKind, SyncFlag> = tracked
            .iter()
            .map(|&kind| (kind, SyncFlag { tx: Arc::new(watch::channel(false).0) }))
            .collect();
        let mut gating: Vec<ResourceKind> = gating.iter().copied().filter(|k| flags.contains_key(k)).collect();
        gating.sort_unstable();
        gating.dedup();
        Self { flags, gating }
    }

    /// Every tracked kind gates readiness.
    pub fn all(tracked: &[ResourceKind]) -> Self { Self::new(tracked, tracked) }

    pub fn flag(&self, kind: ResourceKind) -> Option<SyncFlag> { self.flags.get(&kind).cloned() }

    pub fn is_tracked(&self, kind: ResourceKind) -> bool { self.flags.contains_key(&kind) }

    pub fn is_synced(&self, kind: ResourceKind) -> bool {
        self.flags.get(&kind).map(SyncFlag::is_synced).unwrap_or(false)
    }

    pub fn tracked(&self) -> impl Iterator<Item = ResourceKind> + '_ { self.flags.keys().copied() }

    pub fn gating(&self) -> &[ResourceKind] { &self.gating }

    pub fn synced_count(&self) -> usize { self.flags.values().filter(|f| f.is_synced()).count() }

    /// Gating kinds that have not completed their initial list.
    pub fn pending(&self) -> Vec<ResourceKind> {
        self.gating.iter().copied().filter(|k| !self.is_synced(*k)).collect()
    }

    pub fn ready(&self) -> bool { self.gating.iter().all(|k| self.is_synced(*k)) }

    /// Wait until every gating kind has synced or `token` is cancelled.
    pub async fn wait(&self, token: &CancellationToken) -> Readiness {
        if self.ready() { return Readiness::Ready; }
        for kind in &self.gating {
            let Some(flag) = self.flags.get(kind) else { continue };
            let mut rx = flag.tx.subscribe();
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(pending = ?self.pending(), "readiness wait cancelled");
                    return Readiness::Cancelled;
                }
                closed = async { rx.wait_for(|synced| *synced).await.is_err() } => {
                    // The sender lives as long as the gate, so this cannot close early.
                    if closed { return Readiness::Cancelled; }
                }
            }
        }
        Readiness::Ready
    }
}
