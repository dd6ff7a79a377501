//! Capability traits at the system's two external seams (spec.md §6, §9 "dynamic
//! dispatch": a tagged variant plus a small capability trait, never open-ended
//! subclassing). Grounded on the `async_trait`-based `ChangeSource`/`GraphStore`
//! seams in the Jakedismo-codegraph-rust incremental updater.

use async_trait::async_trait;

use crate::error::IceError;
use crate::types::{ChangeEvent, FilePath};

/// Delivers filesystem change events into the engine. `next_change` suspends until an
/// event is available or the source is closed.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn next_change(&mut self) -> Option<ChangeEvent>;
}

/// What the engine hands to a sink after every successful update: identity plus an
/// opaque, read-only content handle.
#[derive(Debug, Clone)]
pub struct EmittedContext {
    pub path: FilePath,
    pub hash: [u8; 16],
    pub size: u64,
    pub mtime: std::time::SystemTime,
    pub content: bytes::Bytes,
}

/// Receives a fully-updated file context. Implementations must treat `content` as
/// read-only.
#[async_trait]
pub trait ContextSink: Send + Sync {
    async fn accept(&mut self, context: EmittedContext) -> Result<(), IceError>;
}
