//! Compile-time mapping from Kubernetes types to their collections.

use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Event, Namespace, Node, PersistentVolumeClaim, Pod, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::Resource;
use kview_core::{EventTarget, MalformedEvent, Notification, ObjectId, ResourceKind, ShardPlanner};
use serde::{de::DeserializeOwned, Serialize};

use crate::view::{LatestMessages, Upsert, ViewStore};

/// What applying one notification did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Delete of a name that was not present.
    Absent,
    /// Latest message overwritten.
    Latest,
    /// Deletes of events keep no history.
    Ignored,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Inserted => "inserted",
            Applied::Replaced => "replaced",
            Applied::Removed => "removed",
            Applied::Absent => "absent",
            Applied::Latest => "latest",
            Applied::Ignored => "ignored",
        }
    }
}

/// A Kubernetes type mirrored by kview.
pub trait Tracked:
    Resource<DynamicType = ()> + Clone + Default + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
    const KIND: ResourceKind;

    /// Apply one notification to this kind's storage inside `cache`.
    fn apply(cache: &Cache, n: Notification<Self>) -> Result<Applied, MalformedEvent>;
}

/// A tracked kind kept as full namespace collections (every kind but events).
pub trait Persistent: Tracked {
    fn collection(cache: &Cache) -> &ViewStore<Self>;
}

/// Runtime kind to static type dispatch, see [`visit`].
pub trait KindVisitor {
    fn persistent<K: Persistent>(&mut self);
    fn events(&mut self);
}

/// `(namespace, name)` of an object; cluster-scoped objects get the empty namespace.
pub fn object_id<K: Resource>(obj: &K) -> Result<ObjectId, MalformedEvent> {
    let meta = obj.meta();
    let name = meta.name.as_deref().filter(|n| !n.is_empty()).ok_or(MalformedEvent::MissingName)?;
    Ok(ObjectId::new(meta.namespace.clone().unwrap_or_default(), name))
}

/// The object an event is about. Falls back to the event's own namespace when the
/// involved object reference omits it.
pub fn event_target(ev: &Event) -> Result<EventTarget, MalformedEvent> {
    let obj = &ev.involved_object;
    let kind = obj.kind.as_deref().filter(|k| !k.is_empty()).ok_or(MalformedEvent::MissingTarget)?;
    let name = obj.name.as_deref().filter(|n| !n.is_empty()).ok_or(MalformedEvent::MissingTarget)?;
    let namespace = obj.namespace.clone().or_else(|| ev.metadata.namespace.clone()).unwrap_or_default();
    Ok(EventTarget::new(namespace, kind, name))
}

fn apply_to<K: Tracked>(store: &ViewStore<K>, n: Notification<K>) -> Result<Applied, MalformedEvent> {
    match n {
        Notification::Added(obj) | Notification::Updated(_, obj) => {
            let id = object_id(&obj)?;
            Ok(match store.upsert(&id.namespace, &id.name, Arc::new(obj)) {
                Upsert::Inserted => Applied::Inserted,
                Upsert::Replaced => Applied::Replaced,
            })
        }
        Notification::Deleted(obj) => {
            let id = object_id(&obj)?;
            Ok(if store.remove(&id.namespace, &id.name) { Applied::Removed } else { Applied::Absent })
        }
    }
}

impl Tracked for Event {
    const KIND: ResourceKind = ResourceKind::Event;

    fn apply(cache: &Cache, n: Notification<Self>) -> Result<Applied, MalformedEvent> {
        match n {
            Notification::Added(ev) | Notification::Updated(_, ev) => {
                let target = event_target(&ev)?;
                cache.events.set(target, ev.message.unwrap_or_default());
                Ok(Applied::Latest)
            }
            Notification::Deleted(_) => Ok(Applied::Ignored),
        }
    }
}

macro_rules! persistent_kinds {
    ($($field:ident: $ty:ty => $kind:ident),* $(,)?) => {
        /// Every tracked collection, one strongly typed store per kind, plus the
        /// latest-message projection for events.
        pub struct Cache {
            $($field: ViewStore<$ty>,)*
            events: LatestMessages,
        }

        impl Cache {
            pub fn new(planner: ShardPlanner) -> Self {
                Self {
                    $($field: ViewStore::new(ResourceKind::$kind, planner),)*
                    events: LatestMessages::new(planner),
                }
            }

            /// Objects (or event targets) currently held for `kind`.
            pub fn len(&self, kind: ResourceKind) -> usize {
                match kind {
                    $(ResourceKind::$kind => self.$field.len(),)*
                    ResourceKind::Event => self.events.len(),
                }
            }
        }

        $(
            impl Tracked for $ty {
                const KIND: ResourceKind = ResourceKind::$kind;

                fn apply(cache: &Cache, n: Notification<Self>) -> Result<Applied, MalformedEvent> {
                    apply_to(&cache.$field, n)
                }
            }

            impl Persistent for $ty {
                fn collection(cache: &Cache) -> &ViewStore<Self> { &cache.$field }
            }
        )*

        /// Call the visitor method matching `kind` with its static type.
        pub fn visit<V: KindVisitor>(kind: ResourceKind, visitor: &mut V) {
            match kind {
                $(ResourceKind::$kind => visitor.persistent::<$ty>(),)*
                ResourceKind::Event => visitor.events(),
            }
        }
    };
}

persistent_kinds! {
    namespaces: Namespace => Namespace,
    ingresses: Ingress => Ingress,
    services: Service => Service,
    secrets: Secret => Secret,
    stateful_sets: StatefulSet => StatefulSet,
    deployments: Deployment => Deployment,
    pods: Pod => Pod,
    config_maps: ConfigMap => ConfigMap,
    replica_sets: ReplicaSet => ReplicaSet,
    endpoints: Endpoints => Endpoints,
    nodes: Node => Node,
    storage_classes: StorageClass => StorageClass,
    claims: PersistentVolumeClaim => PersistentVolumeClaim,
    autoscalers: HorizontalPodAutoscaler => HorizontalPodAutoscaler,
}

impl Cache {
    pub fn events(&self) -> &LatestMessages { &self.events }
}

impl Default for Cache {
    fn default() -> Self { Self::new(ShardPlanner::default()) }
}
