//! kview public API (in-process).
//!
//! Frontends configure a [`Mirror`], start it with a source factory, gate on
//! readiness and read through the [`QueryFacade`].

#![forbid(unsafe_code)]

mod config;
mod mirror;
mod query;

pub use config::{ConfigError, MirrorConfig};
pub use kview_core::{EventTarget, LabelSelector, QueryError, ResourceKind, SyncError};
pub use kview_store::{Persistent, Readiness, SourceFactory, Tracked};
pub use mirror::{KindExit, Mirror, Running};
pub use query::QueryFacade;
