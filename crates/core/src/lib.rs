//! kview core types: kinds, keys, notifications, the source contract and errors.

#![forbid(unsafe_code)]

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

mod kind;
mod selector;

pub use kind::{ParseKindError, ResourceKind};
pub use selector::{LabelSelector, SelectorError};

pub mod prelude {
    pub use super::{
        EventTarget, LabelSelector, ListWatch, MalformedEvent, NamespaceKey, Notification, ObjectId,
        QueryError, ResourceKind, SyncError,
    };
}

/// Stable identity of a persistent object: `(namespace, name)`.
/// Cluster-scoped objects use the empty namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub namespace: String,
    pub name: String,
}

impl ObjectId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() { f.write_str(&self.name) } else { write!(f, "{}/{}", self.namespace, self.name) }
    }
}

/// Composite key of one collection: `(kind, namespace)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespaceKey {
    pub kind: ResourceKind,
    pub namespace: String,
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() { write!(f, "{}/-", self.kind) } else { write!(f, "{}/{}", self.kind, self.namespace) }
    }
}

/// The object an event talks about; key of the latest-message projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTarget {
    pub namespace: String,
    /// Kind as reported by the event (e.g. `Pod`), not a [`ResourceKind`].
    pub kind: String,
    pub name: String,
}

impl EventTarget {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), kind: kind.into(), name: name.into() }
    }
}

/// One object lifecycle notification as delivered by a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<K> {
    Added(K),
    /// `(old, new)`; the identity of both is expected to be the same.
    Updated(K, K),
    Deleted(K),
}

impl<K> Notification<K> {
    pub fn op(&self) -> &'static str {
        match self {
            Notification::Added(_) => "added",
            Notification::Updated(..) => "updated",
            Notification::Deleted(_) => "deleted",
        }
    }

    /// The object whose identity decides where this notification is applied.
    pub fn object(&self) -> &K {
        match self {
            Notification::Added(o) | Notification::Updated(_, o) | Notification::Deleted(o) => o,
        }
    }
}

pub type NotificationStream<K> = BoxStream<'static, Notification<K>>;

/// The cluster client collaborator for one kind: a one-shot bulk list plus an
/// unbounded notification stream that reconnects on its own.
#[async_trait::async_trait]
pub trait ListWatch<K>: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<K>>;

    /// Notifications emitted after (or overlapping) the list. Delivery is
    /// at-least-once and ordered per object.
    fn watch(&self) -> NotificationStream<K>;
}

/// Failure of one kind's synchronizer. Other kinds are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("initial list of {kind} failed: {source}")]
    List {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("{kind} was cancelled before its initial list completed")]
    Cancelled { kind: ResourceKind },
}

impl SyncError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            SyncError::List { kind, .. } | SyncError::Cancelled { kind } => *kind,
        }
    }
}

/// A notification whose object cannot be placed in the view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("object has no metadata.name")]
    MissingName,
    #[error("event has no involved object kind/name")]
    MissingTarget,
}

/// Query failures. Absence of an object is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum QueryError {
    #[error("{0} has not completed its initial sync")]
    Unsynced(ResourceKind),
    #[error("{0} is not tracked by this mirror")]
    NotTracked(ResourceKind),
}

/// Maps a collection key onto one of a fixed number of lock shards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardPlanner { buckets: u16 }

impl ShardPlanner {
    pub fn new(buckets: usize) -> Self {
        Self { buckets: buckets.clamp(1, u16::MAX as usize) as u16 }
    }

    pub fn buckets(&self) -> usize { self.buckets as usize }

    /// FNV-1a over the key bytes, modulo the bucket count.
    pub fn shard(&self, key: &str) -> usize {
        if self.buckets <= 1 { return 0; }
        let mut h: u64 = 0xcbf29ce484222325; // 64-bit FNV-1a offset
        for b in key.as_bytes() { h ^= *b as u64; h = h.wrapping_mul(0x100000001b3); }
        (h % self.buckets as u64) as usize
    }
}

impl Default for ShardPlanner {
    fn default() -> Self { Self::new(16) }
}
