//! `IceEngine` — the facade wiring C1-C8 together (spec.md §2, §6).

use std::sync::Arc;

use parking_lot::Mutex;

use crate::analyzer::{ScanReport, Scanner};
use crate::config::{ConfigError, EngineConfig};
use crate::graph::{DependencyGraph, GraphStats};
use crate::interfaces::{ContextSink, EmittedContext};
use crate::io::IoOptimizer;
use crate::stats::StatsSnapshot;
use crate::types::{ChangeEvent, ChangeKind, CyclicDependency, FilePath, UpdateOptions, UpdateRequest, UpdateResult};
use crate::updater::IncrementalUpdater;

pub struct IceEngine {
    graph: Mutex<DependencyGraph>,
    scanner: Scanner,
    io: Arc<IoOptimizer>,
    updater: IncrementalUpdater,
    sink: tokio::sync::Mutex<Option<Box<dyn ContextSink>>>,
}

impl IceEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let io = Arc::new(IoOptimizer::new(&config));
        let updater = IncrementalUpdater::new(&config, io.clone());
        let scanner = Scanner::new(&config);
        Ok(Self {
            graph: Mutex::new(DependencyGraph::new()),
            scanner,
            io,
            updater,
            sink: tokio::sync::Mutex::new(None),
        })
    }

    pub fn io(&self) -> &Arc<IoOptimizer> {
        &self.io
    }

    /// Installs the `ContextSink` that receives every successfully updated file
    /// (spec.md §2: the data flow ends by "handing the final set to the Context
    /// Sink"). Replaces any previously installed sink.
    pub async fn set_sink(&self, sink: Box<dyn ContextSink>) {
        *self.sink.lock().await = Some(sink);
    }

    /// Hands each updated file's cached content to the installed sink, if any. A
    /// sink rejection is logged and does not fail the update that already
    /// succeeded.
    async fn emit_to_sink(&self, result: &UpdateResult) {
        if !result.success || result.updated_files.is_empty() {
            return;
        }
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return;
        };
        for path in &result.updated_files {
            let Some(ctx) = self.updater.get_cached(path) else {
                continue;
            };
            let emitted = EmittedContext {
                path: path.clone(),
                hash: ctx.hash,
                size: ctx.size,
                mtime: ctx.mtime,
                content: bytes::Bytes::from(ctx.content),
            };
            if let Err(e) = sink.accept(emitted).await {
                tracing::warn!(%path, %e, "context sink rejected an updated file");
            }
        }
    }

    /// Full cold-start scan of `root`; rebuilds the graph from scratch (spec.md §6
    /// "Persisted state: none").
    pub fn scan_project(&self, root: &FilePath) -> ScanReport {
        let mut graph = self.graph.lock();
        *graph = DependencyGraph::new();
        self.scanner.scan_project(root, &mut graph)
    }

    /// Applies one `ChangeEvent` from a `ChangeSource`: `Created`/`Modified` reparse
    /// the file and cascade-refresh its transitive dependents; `Deleted` removes the
    /// node and cascade-refreshes its former dependents (spec.md §6).
    pub async fn handle_change(&self, event: ChangeEvent, options: &UpdateOptions) -> UpdateResult {
        match event.kind {
            ChangeKind::Deleted => {
                let (affected, snapshot) = {
                    let mut graph = self.graph.lock();
                    let affected: Vec<FilePath> = graph.affected_files(&event.path).into_iter().collect();
                    graph.remove_node(&event.path);
                    (affected, graph.clone())
                };
                self.updater.invalidate(&event.path);
                let result = self
                    .updater
                    .process_update(UpdateRequest::Batch(affected), options, &snapshot)
                    .await;
                self.emit_to_sink(&result).await;
                result
            }
            ChangeKind::Created | ChangeKind::Modified => {
                let snapshot = {
                    let mut graph = self.graph.lock();
                    if graph.contains(&event.path) {
                        let _ = self.scanner.reparse_file(&event.path, &mut graph);
                    } else {
                        let metadata = std::fs::metadata(event.path.as_path());
                        let (size, mtime) = metadata
                            .map(|m| (m.len(), m.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH)))
                            .unwrap_or((0, std::time::SystemTime::UNIX_EPOCH));
                        graph.add_node(event.path.clone(), size, mtime);
                        let _ = self.scanner.reparse_file(&event.path, &mut graph);
                    }
                    graph.clone()
                };
                let result = self
                    .updater
                    .process_update(UpdateRequest::Cascade(event.path.clone()), options, &snapshot)
                    .await;
                self.emit_to_sink(&result).await;
                result
            }
        }
    }

    pub async fn process_update(&self, request: UpdateRequest, options: &UpdateOptions) -> UpdateResult {
        let snapshot = self.graph.lock().clone();
        let result = self.updater.process_update(request, options, &snapshot).await;
        self.emit_to_sink(&result).await;
        result
    }

    pub fn detect_cycles(&self) -> Vec<CyclicDependency> {
        self.graph.lock().detect_cycles()
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph.lock().stats()
    }

    pub fn to_dot(&self) -> String {
        self.graph.lock().to_dot()
    }

    pub fn update_stats(&self) -> StatsSnapshot {
        self.updater.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.updater.cache_len()
    }

    pub fn shutdown(&self) {
        self.updater.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct RecordingSink {
        received: Arc<StdMutex<Vec<FilePath>>>,
    }

    #[async_trait::async_trait]
    impl ContextSink for RecordingSink {
        async fn accept(&mut self, context: EmittedContext) -> Result<(), crate::error::IceError> {
            self.received.lock().unwrap().push(context.path);
            Ok(())
        }
    }

    #[tokio::test]
    async fn scan_then_smart_update_is_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.ts"), "import './utils';").unwrap();
        fs::write(dir.path().join("utils.ts"), "").unwrap();

        let engine = IceEngine::new(EngineConfig::default()).unwrap();
        let root = FilePath::new(dir.path());
        let report = engine.scan_project(&root);
        assert_eq!(report.files_scanned, 2);

        let utils = FilePath::new(dir.path().join("utils.ts"));
        let opts = UpdateOptions::default();
        let first = engine
            .process_update(UpdateRequest::Smart(utils.clone()), &opts)
            .await;
        assert_eq!(first.processed_count, 1);

        let second = engine
            .process_update(UpdateRequest::Smart(utils), &opts)
            .await;
        assert_eq!(second.skipped_count, 1);
    }

    #[tokio::test]
    async fn successful_update_is_handed_to_the_installed_sink() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.ts"), "").unwrap();

        let engine = IceEngine::new(EngineConfig::default()).unwrap();
        let root = FilePath::new(dir.path());
        engine.scan_project(&root);

        let received = Arc::new(StdMutex::new(Vec::new()));
        engine
            .set_sink(Box::new(RecordingSink {
                received: received.clone(),
            }))
            .await;

        let main = FilePath::new(dir.path().join("main.ts"));
        engine
            .process_update(UpdateRequest::Single(main.clone()), &UpdateOptions::default())
            .await;

        assert_eq!(received.lock().unwrap().as_slice(), &[main]);
    }

    #[tokio::test]
    async fn deleted_change_evicts_the_deleted_files_own_cache_entry() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.ts"), "").unwrap();

        let engine = IceEngine::new(EngineConfig::default()).unwrap();
        let root = FilePath::new(dir.path());
        engine.scan_project(&root);

        let main = FilePath::new(dir.path().join("main.ts"));
        engine
            .process_update(UpdateRequest::Single(main.clone()), &UpdateOptions::default())
            .await;
        assert_eq!(engine.cache_len(), 1);

        let event = ChangeEvent {
            kind: ChangeKind::Deleted,
            path: main,
            timestamp: std::time::SystemTime::now(),
        };
        engine.handle_change(event, &UpdateOptions::default()).await;

        assert_eq!(engine.cache_len(), 0);
    }

    #[tokio::test]
    async fn shutdown_short_circuits_subsequent_updates() {
        let engine = IceEngine::new(EngineConfig::default()).unwrap();
        engine.shutdown();
        let result = engine
            .process_update(
                UpdateRequest::Single(FilePath::new("/whatever.ts")),
                &UpdateOptions::default(),
            )
            .await;
        assert!(!result.success);
    }
}
