//! Read/write coalescing (part of C2, spec.md §4.2).
//!
//! Concurrent callers asking for the same path within a batch window share one
//! underlying operation instead of each triggering their own I/O — the "singleflight"
//! pattern. Grounded on the batching behavior of the jcn363-AI_IDE async I/O
//! optimizer's `batch_read_files`, generalized here to also cover writes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::IceError;
use crate::types::FilePath;

type InflightRead = Arc<AsyncMutex<Option<Result<Bytes, IceError>>>>;

/// Coalesces concurrent reads of the same path: the first caller performs `loader`
/// while later callers for the same path, arriving before it finishes, wait on the
/// same slot and receive a cheap clone of the same bytes (or the same fanned-out
/// error).
#[derive(Default)]
pub struct ReadCoalescer {
    inflight: DashMap<FilePath, InflightRead>,
}

impl ReadCoalescer {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    pub async fn read<F, Fut>(&self, path: &FilePath, loader: F) -> Result<Bytes, IceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, IceError>>,
    {
        let slot = self
            .inflight
            .entry(path.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        if let Some(result) = guard.as_ref() {
            return clone_result(result);
        }

        let result = loader().await;
        *guard = Some(clone_result(&result));
        drop(guard);
        self.inflight.remove(path);
        result
    }
}

fn clone_result(result: &Result<Bytes, IceError>) -> Result<Bytes, IceError> {
    match result {
        Ok(bytes) => Ok(bytes.clone()),
        Err(e) => Err(e.fan_out_clone()),
    }
}

/// Outcome of a coalesced write: `bytes_written == 0` marks a write that was
/// superseded by a later overwrite before it was ever applied (DESIGN NOTES §9b).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub bytes_written: usize,
    pub applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

struct PendingWrite {
    mode: WriteMode,
    sequence: u64,
}

/// Per-path FIFO gate for append writes: each caller draws a ticket and waits until
/// it is the lowest outstanding ticket for that path before touching disk, so
/// concurrent appends to the same path land in the order they were requested rather
/// than in whatever order their own disk I/O happens to complete.
#[derive(Default)]
pub struct AppendLane {
    next_ticket: std::sync::atomic::AtomicU64,
    next_to_serve: std::sync::atomic::AtomicU64,
    notify: tokio::sync::Notify,
}

impl AppendLane {
    fn draw_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    pub(crate) async fn wait_turn(&self, ticket: u64) {
        while self.next_to_serve.load(std::sync::atomic::Ordering::Acquire) != ticket {
            self.notify.notified().await;
        }
    }

    /// Releases the lane for the next ticket. Must be called exactly once per
    /// `wait_turn`, including on the write-failure path, or later tickets deadlock.
    pub(crate) fn advance(&self) {
        self.next_to_serve.fetch_add(1, std::sync::atomic::Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Keyed write coalescing. Append writes to the same path are serialized through an
/// `AppendLane` in arrival order, each contributing its own byte count. Overwrite
/// writes to the same path within the same coalescing window collapse to the most
/// recent one; every superseded overwrite reports `bytes_written = 0, applied = false`.
#[derive(Default)]
pub struct WriteCoalescer {
    pending: parking_lot::Mutex<HashMap<FilePath, PendingWrite>>,
    next_sequence: std::sync::atomic::AtomicU64,
    append_lanes: DashMap<FilePath, Arc<AppendLane>>,
}

impl WriteCoalescer {
    pub fn new() -> Self {
        Self {
            pending: parking_lot::Mutex::new(HashMap::new()),
            next_sequence: std::sync::atomic::AtomicU64::new(0),
            append_lanes: DashMap::new(),
        }
    }

    /// Draws this caller's place in `path`'s append queue. Await `wait_turn` on the
    /// returned lane with the returned ticket before writing, and call `advance`
    /// unconditionally afterward.
    pub fn append_lane(&self, path: &FilePath) -> (Arc<AppendLane>, u64) {
        let lane = self
            .append_lanes
            .entry(path.clone())
            .or_insert_with(|| Arc::new(AppendLane::default()))
            .clone();
        let ticket = lane.draw_ticket();
        (lane, ticket)
    }

    /// Registers an intent to write `path` in `mode`, returning the sequence number
    /// assigned to this call. Overwrites must re-check `is_superseded` against this
    /// sequence after waiting out the coalescing window, before touching disk; a
    /// later-registered overwrite to the same path always wins.
    pub fn register(&self, path: &FilePath, mode: WriteMode) -> u64 {
        let sequence = self
            .next_sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if mode == WriteMode::Overwrite {
            self.pending.lock().insert(path.clone(), PendingWrite { mode, sequence });
        }
        sequence
    }

    /// True if a later overwrite to `path` was registered after `sequence`, meaning
    /// the caller holding `sequence` must not perform its write.
    pub fn is_superseded(&self, path: &FilePath, sequence: u64) -> bool {
        matches!(
            self.pending.lock().get(path),
            Some(entry) if entry.mode == WriteMode::Overwrite && entry.sequence > sequence
        )
    }

    pub fn superseded_outcome() -> WriteOutcome {
        WriteOutcome { bytes_written: 0, applied: false }
    }

    pub fn applied_outcome(bytes_written: usize) -> WriteOutcome {
        WriteOutcome { bytes_written, applied: true }
    }
}
