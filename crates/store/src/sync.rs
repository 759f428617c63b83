//! Per-kind list-then-watch synchronizer.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use kube::Resource;
use kview_core::{ListWatch, Notification, SyncError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate::SyncFlag;
use crate::tracked::{Cache, Tracked};

/// Produces the cluster client collaborator for each tracked kind.
pub trait SourceFactory: Send + Sync {
    fn source<K: Tracked>(&self) -> Box<dyn ListWatch<K>>;
}

/// Drives one kind: bulk list into the cache, flip the sync flag, then apply
/// watch notifications in delivery order until cancelled.
pub struct Synchronizer<K> {
    source: Box<dyn ListWatch<K>>,
    cache: Arc<Cache>,
    flag: SyncFlag,
}

impl<K: Tracked> Synchronizer<K> {
    pub fn new(source: Box<dyn ListWatch<K>>, cache: Arc<Cache>, flag: SyncFlag) -> Self {
        Self { source, cache, flag }
    }

    /// Runs until the watch ends or `token` fires. A failed list leaves the sync
    /// flag untouched and is returned to the caller.
    pub async fn run(self, token: CancellationToken) -> Result<(), SyncError> {
        let kind = K::KIND;
        let t0 = Instant::now();
        info!(kind = %kind, "initial list start");
        let listed = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(kind = %kind, "cancelled during initial list");
                return Err(SyncError::Cancelled { kind });
            }
            res = self.source.list() => res,
        };
        let items = match listed {
            Ok(items) => items,
            Err(source) => {
                warn!(kind = %kind, error = %source, took_ms = %t0.elapsed().as_millis(), "initial list failed");
                return Err(SyncError::List { kind, source });
            }
        };
        let count = items.len();
        for obj in items {
            self.apply(Notification::Added(obj));
        }
        metrics::gauge!("kview_list_objects", count as f64, "kind" => kind.as_str());
        if self.flag.mark_synced() {
            metrics::increment_gauge!("kview_synced_kinds", 1.0);
        }
        info!(kind = %kind, count, took_ms = %t0.elapsed().as_millis(), "initial list done; kind synced");

        let mut stream = self.source.watch();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(kind = %kind, "watch cancelled");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(n) => self.apply(n),
                    None => {
                        warn!(kind = %kind, "watch stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn apply(&self, n: Notification<K>) {
        let kind = K::KIND;
        let op = n.op();
        let name = n.object().meta().name.clone();
        match K::apply(&self.cache, n) {
            Ok(applied) => {
                metrics::counter!("kview_events_total", 1u64, "kind" => kind.as_str(), "op" => op);
                debug!(kind = %kind, op, name = ?name, applied = applied.as_str(), "notification applied");
            }
            Err(e) => {
                metrics::counter!("kview_malformed_events_total", 1u64, "kind" => kind.as_str());
                warn!(kind = %kind, op, name = ?name, error = %e, "dropping malformed notification");
            }
        }
    }
}
