//! Incremental Updater (C5, spec.md §4.5) — the orchestrator tying the cache, the I/O
//! optimizer and the dependency graph together behind one `process_update` entry
//! point. Grounded on the rollback-on-failure, best-effort-recovery shape of
//! `IncrementalUpdater::update_file` in the Jakedismo-codegraph-rust reference, though
//! this version has nothing to roll back (the cache is the only mutable state and it's
//! only written after a successful read).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::cache::BoundedCache;
use crate::config::EngineConfig;
use crate::error::IceError;
use crate::graph::DependencyGraph;
use crate::io::{IoOptimizer, ReadPriority};
use crate::stats::{StatsSnapshot, UpdateStats};
use crate::types::{FileContext, FilePath, UpdateOptions, UpdateRequest, UpdateResult};

pub struct IncrementalUpdater {
    cache: Mutex<BoundedCache<FilePath, FileContext>>,
    io: Arc<IoOptimizer>,
    semaphore: Arc<Semaphore>,
    update_timeout: std::time::Duration,
    stats: UpdateStats,
    destroyed: AtomicBool,
}

impl IncrementalUpdater {
    pub fn new(config: &EngineConfig, io: Arc<IoOptimizer>) -> Self {
        Self {
            cache: Mutex::new(BoundedCache::new(config.cache_max_entries, config.cache_max_bytes)),
            io,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_updates)),
            update_timeout: config.update_timeout,
            stats: UpdateStats::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Evicts `path`'s own cache entry, if present. Used for `ChangeKind::Deleted`:
    /// the deleted file itself never goes through `process_single` again (there is
    /// nothing left to read), so nothing else would ever clear its stale entry.
    pub fn invalidate(&self, path: &FilePath) {
        self.cache.lock().remove(path);
    }

    /// Reads back a cached `FileContext` for handing to a `ContextSink` after a
    /// successful update.
    pub fn get_cached(&self, path: &FilePath) -> Option<FileContext> {
        self.cache.lock().peek(path).cloned()
    }

    /// I6: after `destroy()`, every subsequent call returns immediately without side
    /// effects. Closing the semaphore unblocks any waiter still parked on a permit.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.semaphore.close();
        self.cache.lock().clear();
        self.stats.clear();
    }

    pub async fn process_update(
        &self,
        request: UpdateRequest,
        options: &UpdateOptions,
        graph: &DependencyGraph,
    ) -> UpdateResult {
        if self.destroyed.load(Ordering::SeqCst) {
            return UpdateResult::destroyed();
        }

        let start = Instant::now();
        let mut result = match request {
            UpdateRequest::Single(path) => self.process_single(&path, options).await,
            UpdateRequest::Batch(paths) => self.process_batch(paths, options, graph).await,
            UpdateRequest::Cascade(path) => {
                let mut set: Vec<FilePath> = graph.affected_files(&path).into_iter().collect();
                set.sort();
                set.push(path);
                let cascade_options = UpdateOptions {
                    optimize_order: true,
                    ..options.clone()
                };
                self.process_batch(set, &cascade_options, graph).await
            }
            UpdateRequest::Smart(path) => self.process_smart(&path, options).await,
        };
        result.duration = start.elapsed();

        self.stats.record_update(
            result.success,
            result.processed_count,
            result.cache_hit_count > 0,
            result.duration,
        );
        result
    }

    async fn process_smart(&self, path: &FilePath, options: &UpdateOptions) -> UpdateResult {
        if options.use_cache && self.is_cache_valid(path).await {
            return UpdateResult {
                skipped_count: 1,
                cache_hit_count: 1,
                ..UpdateResult::empty_success()
            };
        }
        self.process_single(path, options).await
    }

    async fn process_batch(
        &self,
        mut paths: Vec<FilePath>,
        options: &UpdateOptions,
        graph: &DependencyGraph,
    ) -> UpdateResult {
        if options.optimize_order {
            paths = graph.topological_order(&paths);
        }

        let mut result = UpdateResult::empty_success();
        result.update_order = Some(paths.clone());

        for path in &paths {
            let single = self.process_single(path, options).await;
            result.processed_count += single.processed_count;
            result.skipped_count += single.skipped_count;
            result.cache_hit_count += single.cache_hit_count;
            result.updated_files.extend(single.updated_files);
            result.warnings.extend(single.warnings);

            if !single.success {
                result.success = false;
                result.errors.extend(single.errors);
                if !options.continue_on_error {
                    break;
                }
            }
        }

        self.append_cycle_warnings(&paths, graph, &mut result);
        result
    }

    /// Surfaces cycles touching this batch as warnings rather than errors (spec.md
    /// §7: `CycleDetected` never fails an update, it only annotates one).
    fn append_cycle_warnings(&self, paths: &[FilePath], graph: &DependencyGraph, result: &mut UpdateResult) {
        let touched: std::collections::HashSet<&FilePath> = paths.iter().collect();
        for cycle in graph.detect_cycles() {
            if cycle.cycle.iter().any(|p| touched.contains(p)) {
                let warning = IceError::CycleDetected(cycle.cycle.clone());
                result.warnings.push(warning.to_string());
            }
        }
    }

    async fn process_single(&self, path: &FilePath, options: &UpdateOptions) -> UpdateResult {
        if !path.as_path().exists() {
            return UpdateResult {
                success: false,
                errors: vec![IceError::NotFound(path.clone())],
                ..UpdateResult::empty_success()
            };
        }

        if options.skip_unchanged && self.is_cache_valid(path).await {
            return UpdateResult {
                skipped_count: 1,
                cache_hit_count: 1,
                ..UpdateResult::empty_success()
            };
        }

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                return UpdateResult {
                    success: false,
                    errors: vec![IceError::Destroyed],
                    ..UpdateResult::empty_success()
                }
            }
        };

        let outcome = timeout(self.update_timeout, self.read_and_cache(path)).await;
        drop(permit);

        match outcome {
            Ok(Ok(())) => UpdateResult {
                success: true,
                updated_files: vec![path.clone()],
                processed_count: 1,
                ..UpdateResult::empty_success()
            },
            Ok(Err(e)) => UpdateResult {
                success: false,
                errors: vec![e],
                ..UpdateResult::empty_success()
            },
            Err(_elapsed) => UpdateResult {
                success: false,
                errors: vec![IceError::Timeout {
                    path: path.clone(),
                    after: self.update_timeout,
                }],
                ..UpdateResult::empty_success()
            },
        }
    }

    async fn read_and_cache(&self, path: &FilePath) -> Result<(), IceError> {
        let bytes = self.io.read_file(path, ReadPriority::Normal).await?;
        let metadata = tokio::fs::metadata(path.as_path())
            .await
            .map_err(|e| IceError::io(path.clone(), e))?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let ctx = FileContext::new(bytes.to_vec(), mtime);
        let weight = ctx.size;
        self.cache.lock().insert(path.clone(), ctx, weight)
    }

    /// Cache validity per spec.md §4.5: present, on-disk, and hash-equal. Any failing
    /// condition invalidates (and evicts) the entry.
    async fn is_cache_valid(&self, path: &FilePath) -> bool {
        let cached_hash = match self.cache.lock().peek(path) {
            Some(ctx) => ctx.hash,
            None => return false,
        };

        if !path.as_path().exists() {
            self.cache.lock().remove(path);
            return false;
        }

        let fresh = match self.io.read_file(path, ReadPriority::High).await {
            Ok(bytes) => bytes,
            Err(_) => {
                self.cache.lock().remove(path);
                return false;
            }
        };

        let fresh_hash = md5::compute(&fresh).0;
        if fresh_hash == cached_hash {
            true
        } else {
            self.cache.lock().remove(path);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn updater() -> (IncrementalUpdater, Arc<IoOptimizer>) {
        let config = EngineConfig::default();
        let io = Arc::new(IoOptimizer::new(&config));
        (IncrementalUpdater::new(&config, io.clone()), io)
    }

    #[tokio::test]
    async fn single_update_caches_content_and_hash() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.ts");
        fs::write(&file, b"hello").unwrap();
        let path = FilePath::new(&file);

        let (updater, _io) = updater();
        let graph = DependencyGraph::new();
        let result = updater
            .process_update(
                UpdateRequest::Single(path.clone()),
                &UpdateOptions::default(),
                &graph,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.processed_count, 1);
        assert_eq!(updater.cache_len(), 1);
    }

    #[tokio::test]
    async fn smart_update_is_idempotent_on_unchanged_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.ts");
        fs::write(&file, b"hello").unwrap();
        let path = FilePath::new(&file);

        let (updater, _io) = updater();
        let graph = DependencyGraph::new();
        let opts = UpdateOptions::default();

        let first = updater
            .process_update(UpdateRequest::Smart(path.clone()), &opts, &graph)
            .await;
        assert_eq!(first.processed_count, 1);

        let second = updater
            .process_update(UpdateRequest::Smart(path.clone()), &opts, &graph)
            .await;
        assert_eq!(second.skipped_count, 1);
        assert_eq!(second.cache_hit_count, 1);
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let path = FilePath::new("/does/not/exist.ts");
        let (updater, _io) = updater();
        let graph = DependencyGraph::new();
        let result = updater
            .process_update(
                UpdateRequest::Single(path),
                &UpdateOptions::default(),
                &graph,
            )
            .await;
        assert!(!result.success);
        assert!(matches!(result.errors[0], IceError::NotFound(_)));
    }

    #[tokio::test]
    async fn destroy_short_circuits_future_updates() {
        let (updater, _io) = updater();
        updater.destroy();
        let graph = DependencyGraph::new();
        let result = updater
            .process_update(
                UpdateRequest::Single(FilePath::new("/anything.ts")),
                &UpdateOptions::default(),
                &graph,
            )
            .await;
        assert!(!result.success);
        assert!(matches!(result.errors[0], IceError::Destroyed));
    }

    #[tokio::test]
    async fn batch_respects_topological_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "import './b';").unwrap();
        fs::write(dir.path().join("b.ts"), "").unwrap();
        let a = FilePath::new(dir.path().join("a.ts"));
        let b = FilePath::new(dir.path().join("b.ts"));

        let mut graph = DependencyGraph::new();
        graph.add_node(a.clone(), 0, SystemTime::now());
        graph.add_node(b.clone(), 0, SystemTime::now());
        graph.add_edge(&a, &b);

        let (updater, _io) = updater();
        let result = updater
            .process_update(
                UpdateRequest::Batch(vec![a.clone(), b.clone()]),
                &UpdateOptions::default(),
                &graph,
            )
            .await;

        assert!(result.success);
        let order = result.update_order.unwrap();
        let pos_a = order.iter().position(|p| p == &a).unwrap();
        let pos_b = order.iter().position(|p| p == &b).unwrap();
        assert!(pos_b < pos_a);
    }

    #[tokio::test]
    async fn batch_touching_a_cycle_reports_a_warning_not_a_failure() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "import './b';").unwrap();
        fs::write(dir.path().join("b.ts"), "import './a';").unwrap();
        let a = FilePath::new(dir.path().join("a.ts"));
        let b = FilePath::new(dir.path().join("b.ts"));

        let mut graph = DependencyGraph::new();
        graph.add_node(a.clone(), 0, SystemTime::now());
        graph.add_node(b.clone(), 0, SystemTime::now());
        graph.add_edge(&a, &b);
        graph.add_edge(&b, &a);

        let (updater, _io) = updater();
        let result = updater
            .process_update(
                UpdateRequest::Batch(vec![a.clone(), b.clone()]),
                &UpdateOptions::default(),
                &graph,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("cyclic dependency"));
    }
}
