//! Mirror lifecycle: one synchronizer task per tracked kind, a shared readiness
//! gate, and the query facade over the shared cache.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use k8s_openapi::api::core::v1::Event;
use kview_core::{ResourceKind, ShardPlanner, SyncError};
use kview_store::{visit, Cache, KindVisitor, Persistent, Readiness, ReadinessGate, SourceFactory, Synchronizer, Tracked};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, MirrorConfig};
use crate::query::QueryFacade;

pub type KindExit = (ResourceKind, Result<(), SyncError>);

pub struct Mirror {
    config: MirrorConfig,
    cache: Arc<Cache>,
    gate: Arc<ReadinessGate>,
    started: AtomicBool,
}

impl Mirror {
    /// Repeated kinds collapse to one synchronizer each.
    pub fn new(mut config: MirrorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut seen = BTreeSet::new();
        config.kinds.retain(|k| seen.insert(*k));
        let cache = Arc::new(Cache::new(ShardPlanner::new(config.shards)));
        let gate = Arc::new(ReadinessGate::new(&config.kinds, &config.gating_kinds()));
        Ok(Self { config, cache, gate, started: AtomicBool::new(false) })
    }

    pub fn config(&self) -> &MirrorConfig { &self.config }

    pub fn gate(&self) -> &ReadinessGate { &self.gate }

    /// Spawn one synchronizer per tracked kind. All of them stop when `token` is
    /// cancelled. Only the first call starts anything.
    pub fn start<F: SourceFactory>(&self, factory: &F, token: CancellationToken) -> Running {
        let mut tasks = JoinSet::new();
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("mirror already started; ignoring");
            return Running { tasks };
        }
        let mut spawner = Spawner { factory, cache: &self.cache, gate: &self.gate, token: &token, tasks: &mut tasks };
        for kind in self.gate.tracked() {
            visit(kind, &mut spawner);
        }
        metrics::gauge!("kview_tracked_kinds", self.config.kinds.len() as f64);
        info!(kinds = self.config.kinds.len(), gating = self.gate.gating().len(), ns = ?self.config.namespace, "mirror started");
        Running { tasks }
    }

    pub fn ready(&self) -> bool { self.gate.ready() }

    /// Wait for every gating kind's initial sync, or for `token`.
    pub async fn wait(&self, token: &CancellationToken) -> Readiness { self.gate.wait(token).await }

    pub fn query(&self) -> QueryFacade { QueryFacade::new(Arc::clone(&self.cache), Arc::clone(&self.gate)) }
}

struct Spawner<'a, F> {
    factory: &'a F,
    cache: &'a Arc<Cache>,
    gate: &'a ReadinessGate,
    token: &'a CancellationToken,
    tasks: &'a mut JoinSet<KindExit>,
}

impl<F: SourceFactory> Spawner<'_, F> {
    fn spawn<K: Tracked>(&mut self) {
        let Some(flag) = self.gate.flag(K::KIND) else {
            warn!(kind = %K::KIND, "kind missing from readiness gate; not started");
            return;
        };
        let sync = Synchronizer::<K>::new(self.factory.source::<K>(), Arc::clone(self.cache), flag);
        let token = self.token.clone();
        self.tasks.spawn(async move { (K::KIND, sync.run(token).await) });
    }
}

impl<F: SourceFactory> KindVisitor for Spawner<'_, F> {
    fn persistent<K: Persistent>(&mut self) { self.spawn::<K>() }

    fn events(&mut self) { self.spawn::<Event>() }
}

/// Handle over the running synchronizer tasks. Dropping it aborts them.
pub struct Running {
    tasks: JoinSet<KindExit>,
}

impl Running {
    pub fn len(&self) -> usize { self.tasks.len() }

    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

    /// The next kind whose synchronizer finished, with its outcome.
    pub async fn next_exit(&mut self) -> Option<KindExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok(exit) => {
                    if let (_, Err(e)) = &exit {
                        error!(kind = %e.kind(), error = %e, "synchronizer failed");
                    }
                    return Some(exit);
                }
                Err(e) => error!(error = %e, "synchronizer task aborted"),
            }
        }
    }

    /// Wait for every synchronizer to finish.
    pub async fn join(mut self) -> Vec<KindExit> {
        let mut out = Vec::with_capacity(self.tasks.len());
        while let Some(exit) = self.next_exit().await {
            out.push(exit);
        }
        out
    }
}
