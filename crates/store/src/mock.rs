//! Scripted in-memory sources for tests and demos.

use std::any::Any;
use std::sync::{Mutex, MutexGuard};

use futures::StreamExt;
use kview_core::{ListWatch, Notification, NotificationStream, ResourceKind};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};

use crate::sync::SourceFactory;
use crate::tracked::Tracked;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(|e| e.into_inner()) }

/// A source whose list result is fixed up front and whose watch replays whatever
/// is pushed into the paired sender.
pub struct ScriptedSource<K> {
    list: Mutex<Option<anyhow::Result<Vec<K>>>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<Notification<K>>>>,
}

impl<K: Send + 'static> ScriptedSource<K> {
    pub fn new(items: Vec<K>) -> (Self, mpsc::UnboundedSender<Notification<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let me = Self { list: Mutex::new(Some(Ok(items))), hold: Mutex::new(None), events: Mutex::new(Some(rx)) };
        (me, tx)
    }

    /// Lists nothing and never emits.
    pub fn idle() -> Self {
        Self { list: Mutex::new(Some(Ok(Vec::new()))), hold: Mutex::new(None), events: Mutex::new(None) }
    }

    pub fn failing(msg: &str) -> Self {
        Self { list: Mutex::new(Some(Err(anyhow::anyhow!(msg.to_string())))), hold: Mutex::new(None), events: Mutex::new(None) }
    }

    /// Block `list` until the returned sender fires or is dropped.
    pub fn hold_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.hold) = Some(rx);
        tx
    }
}

#[async_trait::async_trait]
impl<K: Send + Sync + 'static> ListWatch<K> for ScriptedSource<K> {
    async fn list(&self) -> anyhow::Result<Vec<K>> {
        let hold = lock(&self.hold).take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        lock(&self.list).take().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn watch(&self) -> NotificationStream<K> {
        match lock(&self.events).take() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|n| (n, rx)) }).boxed(),
            None => futures::stream::pending().boxed(),
        }
    }
}

/// Hands out pre-registered [`ScriptedSource`]s by kind; unregistered kinds get an
/// idle source.
#[derive(Default)]
pub struct ScriptedSources {
    sources: Mutex<FxHashMap<ResourceKind, Box<dyn Any + Send>>>,
}

impl ScriptedSources {
    pub fn new() -> Self { Self::default() }

    pub fn insert<K: Tracked>(&self, source: ScriptedSource<K>) -> &Self {
        lock(&self.sources).insert(K::KIND, Box::new(source));
        self
    }
}

impl SourceFactory for ScriptedSources {
    fn source<K: Tracked>(&self) -> Box<dyn ListWatch<K>> {
        let scripted = lock(&self.sources).remove(&K::KIND).and_then(|b| b.downcast::<ScriptedSource<K>>().ok());
        match scripted {
            Some(source) => source,
            None => Box::new(ScriptedSource::<K>::idle()),
        }
    }
}
