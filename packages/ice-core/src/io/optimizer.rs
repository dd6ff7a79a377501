//! I/O Optimizer (C2, spec.md §4.2): composes the read queue, coalescer and preload
//! cache into the engine-wide `read_file`/`write_file` entry points.

use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::EngineConfig;
use crate::error::IceError;
use crate::types::FilePath;

use super::coalescer::{ReadCoalescer, WriteCoalescer, WriteMode, WriteOutcome};
use super::preload::PreloadCache;
use super::read_queue::{ReadPriority, ReadQueue};

pub struct IoOptimizer {
    read_queue: ReadQueue,
    read_coalescer: ReadCoalescer,
    write_coalescer: WriteCoalescer,
    preload: Mutex<PreloadCache>,
    batch_window: std::time::Duration,
}

impl IoOptimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            read_queue: ReadQueue::new(config.max_concurrent_reads, config.max_queue_size)
                .with_retry(config.max_retries, config.retry_delay),
            read_coalescer: ReadCoalescer::new(),
            write_coalescer: WriteCoalescer::new(),
            preload: Mutex::new(PreloadCache::new(config.preload_cache_size, u64::MAX)),
            batch_window: config.batch_window,
        }
    }

    /// Reads `path`'s full contents, preferring a fresh preload-cache hit, then
    /// coalescing with any concurrent read of the same path, gated by the shared
    /// concurrency semaphore.
    pub async fn read_file(&self, path: &FilePath, priority: ReadPriority) -> Result<Bytes, IceError> {
        let metadata = tokio::fs::metadata(path.as_path())
            .await
            .map_err(|e| IceError::io(path.clone(), e))?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(hit) = self.preload.lock().get(path, mtime) {
            return Ok(hit);
        }

        let _permit = self.read_queue.acquire(path, priority).await?;

        let path_owned = path.clone();
        let bytes = self
            .read_coalescer
            .read(path, move || async move { Self::load(&path_owned).await })
            .await?;

        self.preload.lock().insert(path.clone(), bytes.clone(), mtime);
        Ok(bytes)
    }

    async fn load(path: &FilePath) -> Result<Bytes, IceError> {
        let mut file = tokio::fs::File::open(path.as_path())
            .await
            .map_err(|e| IceError::io(path.clone(), e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| IceError::io(path.clone(), e))?;
        Ok(Bytes::from(buf))
    }

    /// Writes `contents` to `path`. `Append` draws a ticket on `path`'s `AppendLane`
    /// and waits its turn before touching disk, so concurrent appends to the same
    /// path land in the order they were requested rather than in whatever order their
    /// own disk I/O happens to finish. `Overwrite` registers its intent, then waits
    /// out the coalescing window before touching disk at all: if a later overwrite to
    /// the same path registered in the meantime, this call is superseded and never
    /// writes (`bytes_written = 0`), so the last overwrite to register within the
    /// window is the only one that ever reaches the filesystem.
    pub async fn write_file(
        &self,
        path: &FilePath,
        contents: &[u8],
        mode: WriteMode,
    ) -> Result<WriteOutcome, IceError> {
        match mode {
            WriteMode::Append => {
                let (lane, ticket) = self.write_coalescer.append_lane(path);
                lane.wait_turn(ticket).await;

                let result = async {
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path.as_path())
                        .await
                        .map_err(|e| IceError::io(path.clone(), e))?;
                    file.write_all(contents)
                        .await
                        .map_err(|e| IceError::io(path.clone(), e))
                }
                .await;

                lane.advance();
                result?;
                self.preload.lock().clear_one(path);
                Ok(WriteCoalescer::applied_outcome(contents.len()))
            }
            WriteMode::Overwrite => {
                let sequence = self.write_coalescer.register(path, mode);
                tokio::time::sleep(self.batch_window).await;

                if self.write_coalescer.is_superseded(path, sequence) {
                    return Ok(WriteCoalescer::superseded_outcome());
                }

                tokio::fs::write(path.as_path(), contents)
                    .await
                    .map_err(|e| IceError::io(path.clone(), e))?;
                self.preload.lock().clear_one(path);
                Ok(WriteCoalescer::applied_outcome(contents.len()))
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.read_queue.queue_depth()
    }

    pub fn preload_len(&self) -> usize {
        self.preload.lock().len()
    }
}
