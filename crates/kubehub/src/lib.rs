//! kview kubehub: kube client setup and list/watch sources for tracked kinds.

#![forbid(unsafe_code)]

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{watcher, WatchStreamExt},
    Client, Config, Resource,
};
use kview_core::{ListWatch, Notification, NotificationStream, ObjectId};
use kview_store::{object_id, SourceFactory, Tracked};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How to reach the cluster. Empty options mean in-cluster or `$KUBECONFIG`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientOptions {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// Build a client from an explicit kubeconfig/context, or infer one.
pub async fn connect(opts: &ClientOptions) -> Result<Client> {
    let kopts = KubeConfigOptions { context: opts.context.clone(), ..Default::default() };
    let config = match (&opts.kubeconfig, &opts.context) {
        (Some(path), _) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kc, &kopts).await.context("loading kubeconfig")?
        }
        (None, Some(_)) => Config::from_kubeconfig(&kopts).await.context("loading kubeconfig context")?,
        (None, None) => Config::infer().await.context("inferring kube config")?,
    };
    info!(cluster_url = %config.cluster_url, ns = %config.default_namespace, "kube client configured");
    Client::try_from(config).context("building kube client")
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|e| e.into_inner()) }

pub fn strip_managed_fields<K: Resource>(mut obj: K) -> K {
    obj.meta_mut().managed_fields = None;
    obj
}

/// Stand-in for an object that vanished across a relist; carries only its identity.
fn tombstone<K: Tracked>(id: ObjectId) -> K {
    let mut obj = K::default();
    let meta = obj.meta_mut();
    meta.name = Some(id.name);
    meta.namespace = (!id.namespace.is_empty()).then_some(id.namespace);
    obj
}

/// Identities seen so far, used to tell adds from updates and to turn a relist
/// into explicit deletes. Objects themselves are not retained. Event kinds are
/// not remembered at all: their deletes carry no state.
pub struct KnownObjects<K> {
    ids: FxHashSet<ObjectId>,
    strip_managed: bool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Tracked> Default for KnownObjects<K> {
    fn default() -> Self { Self::new(true) }
}

impl<K: Tracked> KnownObjects<K> {
    pub fn new(strip_managed: bool) -> Self { Self { ids: FxHashSet::default(), strip_managed, _kind: PhantomData } }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    fn remembers() -> bool { !K::KIND.is_projection() }

    fn prepare(&self, obj: K) -> K {
        if self.strip_managed { strip_managed_fields(obj) } else { obj }
    }

    /// Result of the initial list: cleaned up and remembered.
    pub fn listed(&mut self, items: Vec<K>) -> Vec<K> {
        let items: Vec<K> = items.into_iter().map(|obj| self.prepare(obj)).collect();
        if Self::remembers() {
            self.ids.extend(items.iter().filter_map(|obj| object_id(obj).ok()));
        }
        items
    }

    /// Unidentifiable objects pass through as `Added` so the synchronizer can
    /// report them. `Updated` carries the new state on both sides.
    pub fn applied(&mut self, obj: K) -> Notification<K> {
        let obj = self.prepare(obj);
        if !Self::remembers() { return Notification::Added(obj); }
        let Ok(id) = object_id(&obj) else { return Notification::Added(obj) };
        if self.ids.insert(id) { Notification::Added(obj) } else { Notification::Updated(obj.clone(), obj) }
    }

    pub fn deleted(&mut self, obj: K) -> Notification<K> {
        let obj = self.prepare(obj);
        if let Ok(id) = object_id(&obj) {
            self.ids.remove(&id);
        }
        Notification::Deleted(obj)
    }

    /// A relist: apply every listed object, then delete known objects that are
    /// no longer present (in identity order).
    pub fn restarted(&mut self, items: Vec<K>) -> Vec<Notification<K>> {
        if !Self::remembers() {
            return items.into_iter().map(|obj| Notification::Added(self.prepare(obj))).collect();
        }
        let previous = std::mem::take(&mut self.ids);
        let mut out = Vec::with_capacity(items.len());
        for obj in items {
            let obj = self.prepare(obj);
            match object_id(&obj) {
                Ok(id) => {
                    let known = previous.contains(&id);
                    self.ids.insert(id);
                    out.push(if known { Notification::Updated(obj.clone(), obj) } else { Notification::Added(obj) });
                }
                Err(_) => out.push(Notification::Added(obj)),
            }
        }
        let mut gone: Vec<ObjectId> = previous.into_iter().filter(|id| !self.ids.contains(id)).collect();
        gone.sort_unstable();
        out.extend(gone.into_iter().map(|id| Notification::Deleted(tombstone(id))));
        out
    }

    pub fn translate(&mut self, ev: watcher::Event<K>) -> Vec<Notification<K>> {
        match ev {
            watcher::Event::Applied(obj) => vec![self.applied(obj)],
            watcher::Event::Deleted(obj) => vec![self.deleted(obj)],
            watcher::Event::Restarted(list) => {
                debug!(count = list.len(), "watch restart");
                self.restarted(list)
            }
        }
    }
}

type WatchEvents<K> = BoxStream<'static, watcher::Result<watcher::Event<K>>>;

/// List/watch of one kind through one kube watcher, optionally restricted to one
/// namespace with a field selector. The initial list is the watcher's first
/// `Restarted` batch, so each kind is listed once at startup.
pub struct KubeSource<K: Tracked> {
    api: Api<K>,
    config: watcher::Config,
    known: Arc<Mutex<KnownObjects<K>>>,
    pending: Mutex<Option<WatchEvents<K>>>,
}

impl<K: Tracked> KubeSource<K> {
    pub fn new(client: Client, namespace: Option<&str>, strip_managed: bool) -> Self {
        let mut config = watcher::Config::default();
        if let Some(ns) = namespace.filter(|_| K::KIND.is_namespaced()) {
            config = config.fields(&format!("metadata.namespace={}", ns));
        }
        Self {
            api: Api::all(client),
            config,
            known: Arc::new(Mutex::new(KnownObjects::new(strip_managed))),
            pending: Mutex::new(None),
        }
    }

    fn events(&self) -> WatchEvents<K> {
        watcher::watcher(self.api.clone(), self.config.clone()).default_backoff().boxed()
    }
}

#[async_trait::async_trait]
impl<K: Tracked> ListWatch<K> for KubeSource<K> {
    async fn list(&self) -> Result<Vec<K>> {
        let pending = lock(&self.pending).take();
        let mut events = pending.unwrap_or_else(|| self.events());
        loop {
            match events.next().await {
                Some(Ok(watcher::Event::Restarted(items))) => {
                    let items = lock(&self.known).listed(items);
                    *lock(&self.pending) = Some(events);
                    return Ok(items);
                }
                // The watcher always opens with a full listing.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(anyhow::Error::new(e).context(format!("listing {}", K::KIND))),
                None => anyhow::bail!("watch for {} ended before its initial list", K::KIND),
            }
        }
    }

    fn watch(&self) -> NotificationStream<K> {
        let pending = lock(&self.pending).take();
        let events = pending.unwrap_or_else(|| self.events());
        let known = Arc::clone(&self.known);
        let kind = K::KIND;
        info!(kind = %kind, fields = ?self.config.field_selector, "watcher started");
        events
            .map(move |res| match res {
                Ok(ev) => lock(&known).translate(ev),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "watch error; retrying with backoff");
                    Vec::new()
                }
            })
            .flat_map(futures::stream::iter)
            .boxed()
    }
}

/// Creates a [`KubeSource`] per kind from one shared client.
pub struct KubeSources {
    client: Client,
    namespace: Option<String>,
    strip_managed: bool,
}

impl KubeSources {
    pub fn new(client: Client, namespace: Option<String>, strip_managed: bool) -> Self {
        Self { client, namespace, strip_managed }
    }
}

impl SourceFactory for KubeSources {
    fn source<K: Tracked>(&self) -> Box<dyn ListWatch<K>> {
        Box::new(KubeSource::<K>::new(self.client.clone(), self.namespace.as_deref(), self.strip_managed))
    }
}
