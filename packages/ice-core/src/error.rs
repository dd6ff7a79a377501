//! Error types for ice-core.
//!
//! Mirrors the error taxonomy of spec.md §7: every per-file failure surfaces as one of
//! these variants and is collected into `UpdateResult.errors` rather than unwinding a
//! whole batch (see `updater::incremental_updater`).

use std::time::Duration;
use thiserror::Error;

use crate::types::FilePath;

#[derive(Debug, Error)]
pub enum IceError {
    #[error("not found: {0}")]
    NotFound(FilePath),

    #[error("permission denied: {0}")]
    PermissionDenied(FilePath),

    #[error("io error on {path}: {source}")]
    Io {
        path: FilePath,
        #[source]
        source: std::io::Error,
    },

    #[error("update of {path} timed out after {after:?}")]
    Timeout { path: FilePath, after: Duration },

    #[error("read queue is full")]
    QueueFull,

    #[error("value of weight {key_weight} exceeds cache capacity {max_bytes}")]
    CapacityExceeded { key_weight: u64, max_bytes: u64 },

    #[error("cyclic dependency detected: {0:?}")]
    CycleDetected(Vec<FilePath>),

    #[error("engine destroyed")]
    Destroyed,

    #[error("operation cancelled")]
    Cancelled,
}

impl IceError {
    pub fn io(path: FilePath, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => IceError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => IceError::PermissionDenied(path),
            _ => IceError::Io { path, source },
        }
    }

    /// Best-effort clone for fanning one failure out to every coalesced waiter.
    /// `std::io::Error` isn't `Clone`, so the `Io` variant's source is rebuilt from its
    /// kind and message rather than copied.
    pub fn fan_out_clone(&self) -> Self {
        match self {
            IceError::NotFound(p) => IceError::NotFound(p.clone()),
            IceError::PermissionDenied(p) => IceError::PermissionDenied(p.clone()),
            IceError::Io { path, source } => IceError::Io {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            IceError::Timeout { path, after } => IceError::Timeout {
                path: path.clone(),
                after: *after,
            },
            IceError::QueueFull => IceError::QueueFull,
            IceError::CapacityExceeded {
                key_weight,
                max_bytes,
            } => IceError::CapacityExceeded {
                key_weight: *key_weight,
                max_bytes: *max_bytes,
            },
            IceError::CycleDetected(c) => IceError::CycleDetected(c.clone()),
            IceError::Destroyed => IceError::Destroyed,
            IceError::Cancelled => IceError::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, IceError>;
