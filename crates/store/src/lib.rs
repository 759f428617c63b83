//! kview store: typed in-RAM collections, readiness gate and per-kind synchronizers.

#![forbid(unsafe_code)]

mod gate;
pub mod mock;
mod sync;
mod tracked;
mod view;

pub use gate::{Readiness, ReadinessGate, SyncFlag};
pub use sync::{SourceFactory, Synchronizer};
pub use tracked::{event_target, object_id, visit, Applied, Cache, KindVisitor, Persistent, Tracked};
pub use view::{LatestMessages, Upsert, ViewStore};
