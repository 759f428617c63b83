//! Per-kind keyed collections.
//!
//! Collections are published through `ArcSwap`, so readers take a lock-free
//! snapshot while writers build the next version with `rcu`. The map from
//! namespace to collection is split into shards, each behind its own `RwLock`
//! that is held only to find or create a slot.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arc_swap::ArcSwap;
use kview_core::{EventTarget, NamespaceKey, ResourceKind, ShardPlanner};
use rustc_hash::FxHashMap;

type Collection<K> = Vec<(String, Arc<K>)>;
type Slot<K> = Arc<ArcSwap<Collection<K>>>;

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> { l.read().unwrap_or_else(|e| e.into_inner()) }
fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> { l.write().unwrap_or_else(|e| e.into_inner()) }

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Namespace-keyed collections of one kind, deduplicated by object name.
pub struct ViewStore<K> {
    kind: ResourceKind,
    planner: ShardPlanner,
    shards: Box<[RwLock<FxHashMap<String, Slot<K>>>]>,
}

impl<K: Send + Sync + 'static> ViewStore<K> {
    pub fn new(kind: ResourceKind, planner: ShardPlanner) -> Self {
        let shards = (0..planner.buckets()).map(|_| RwLock::new(FxHashMap::default())).collect();
        Self { kind, planner, shards }
    }

    pub fn kind(&self) -> ResourceKind { self.kind }

    pub fn key(&self, namespace: &str) -> NamespaceKey {
        NamespaceKey { kind: self.kind, namespace: namespace.to_string() }
    }

    fn shard(&self, namespace: &str) -> &RwLock<FxHashMap<String, Slot<K>>> {
        &self.shards[self.planner.shard(namespace)]
    }

    fn slot(&self, namespace: &str) -> Option<Slot<K>> {
        read(self.shard(namespace)).get(namespace).cloned()
    }

    fn slot_or_create(&self, namespace: &str) -> Slot<K> {
        if let Some(slot) = self.slot(namespace) { return slot; }
        let mut shard = write(self.shard(namespace));
        shard
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(Vec::new())))
            .clone()
    }

    /// Replace the entry named `name` in place, or append it.
    pub fn upsert(&self, namespace: &str, name: &str, obj: Arc<K>) -> Upsert {
        let slot = self.slot_or_create(namespace);
        let prev = slot.rcu(|cur| {
            let mut next: Collection<K> = (**cur).clone();
            match next.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = Arc::clone(&obj),
                None => next.push((name.to_string(), Arc::clone(&obj))),
            }
            next
        });
        if prev.iter().any(|(n, _)| n == name) { Upsert::Replaced } else { Upsert::Inserted }
    }

    /// Delete the entry named `name`; returns false when it was not present.
    pub fn remove(&self, namespace: &str, name: &str) -> bool {
        let Some(slot) = self.slot(namespace) else { return false };
        let prev = slot.rcu(|cur| {
            let mut next: Collection<K> = (**cur).clone();
            next.retain(|(n, _)| n != name);
            next
        });
        prev.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let slot = self.slot(namespace)?;
        let snap = slot.load();
        snap.iter().find(|(n, _)| n == name).map(|(_, o)| Arc::clone(o))
    }

    /// Snapshot of one collection in insertion order; `None` if the namespace was
    /// never populated.
    pub fn list(&self, namespace: &str) -> Option<Vec<Arc<K>>> {
        let slot = self.slot(namespace)?;
        let snap = slot.load();
        Some(snap.iter().map(|(_, o)| Arc::clone(o)).collect())
    }

    /// Every populated namespace, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self.shards.iter().flat_map(|s| read(s).keys().cloned().collect::<Vec<_>>()).collect();
        out.sort_unstable();
        out
    }

    /// Every object across namespaces, grouped by namespace in sorted order.
    pub fn all(&self) -> Vec<Arc<K>> {
        self.namespaces().iter().filter_map(|ns| self.list(ns)).flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| read(s).values().map(|slot| slot.load().len()).sum::<usize>()).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Latest event message per target object. Older messages are overwritten.
pub struct LatestMessages {
    planner: ShardPlanner,
    shards: Box<[RwLock<FxHashMap<EventTarget, String>>]>,
}

impl LatestMessages {
    pub fn new(planner: ShardPlanner) -> Self {
        let shards = (0..planner.buckets()).map(|_| RwLock::new(FxHashMap::default())).collect();
        Self { planner, shards }
    }

    fn shard(&self, target: &EventTarget) -> &RwLock<FxHashMap<EventTarget, String>> {
        &self.shards[self.planner.shard(&target.namespace)]
    }

    pub fn set(&self, target: EventTarget, message: String) {
        write(self.shard(&target)).insert(target, message);
    }

    pub fn get(&self, target: &EventTarget) -> Option<String> {
        read(self.shard(target)).get(target).cloned()
    }

    pub fn len(&self) -> usize { self.shards.iter().map(|s| read(s).len()).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
