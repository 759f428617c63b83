//! Read-only queries over the mirrored view.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use kview_core::{EventTarget, LabelSelector, QueryError, ResourceKind};
use kview_store::{Cache, Persistent, ReadinessGate};

/// Cheap to clone; every call takes a snapshot and never blocks on a watch.
#[derive(Clone)]
pub struct QueryFacade {
    cache: Arc<Cache>,
    gate: Arc<ReadinessGate>,
}

impl QueryFacade {
    pub fn new(cache: Arc<Cache>, gate: Arc<ReadinessGate>) -> Self { Self { cache, gate } }

    fn synced(&self, kind: ResourceKind) -> Result<(), QueryError> {
        if !self.gate.is_tracked(kind) { return Err(QueryError::NotTracked(kind)); }
        if !self.gate.is_synced(kind) { return Err(QueryError::Unsynced(kind)); }
        Ok(())
    }

    pub fn ready(&self) -> bool { self.gate.ready() }

    /// `Ok(None)` when the kind is synced but the object does not exist.
    pub fn get_by_name<K: Persistent>(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>, QueryError> {
        self.synced(K::KIND)?;
        Ok(K::collection(&self.cache).get(namespace, name))
    }

    /// Once synced, a namespace with no objects is a confirmed empty list.
    pub fn list_by_namespace<K: Persistent>(&self, namespace: &str) -> Result<Vec<Arc<K>>, QueryError> {
        self.synced(K::KIND)?;
        Ok(K::collection(&self.cache).list(namespace).unwrap_or_default())
    }

    /// Objects whose labels contain every pair of `selector`.
    pub fn filter_by_label<K: Persistent>(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Arc<K>>, QueryError> {
        let items = self.list_by_namespace::<K>(namespace)?;
        Ok(items.into_iter().filter(|o| selector.matches(o.meta().labels.as_ref())).collect())
    }

    /// Latest event message about an object, or an empty string if none was seen.
    pub fn latest_event_message(&self, namespace: &str, object_kind: &str, object_name: &str) -> String {
        self.cache.events().get(&EventTarget::new(namespace, object_kind, object_name)).unwrap_or_default()
    }

    /// Every object of a kind across namespaces.
    pub fn list_all<K: Persistent>(&self) -> Result<Vec<Arc<K>>, QueryError> {
        self.synced(K::KIND)?;
        Ok(K::collection(&self.cache).all())
    }

    /// Names of mirrored Namespace objects, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, QueryError> {
        let mut names: Vec<String> = self
            .list_by_namespace::<Namespace>("")?
            .iter()
            .filter_map(|ns| ns.meta().name.clone())
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Objects held per tracked kind.
    pub fn counts(&self) -> Vec<(ResourceKind, usize)> {
        self.gate.tracked().map(|k| (k, self.cache.len(k))).collect()
    }
}
