//! Project scan and incremental reparse (part of C4, spec.md §4.4).

use std::collections::HashSet;
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::error::IceError;
use crate::graph::DependencyGraph;
use crate::types::FilePath;

use super::extract::{extract_references, filter_references};
use super::resolve::resolve;

#[derive(Debug, Default)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub errors: Vec<(FilePath, IceError)>,
}

pub struct Scanner {
    extensions: Vec<String>,
    exclude_external: bool,
    max_depth: usize,
    ignore: GlobSet,
}

impl Scanner {
    pub fn new(config: &EngineConfig) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        Self {
            extensions: config.extensions.clone(),
            exclude_external: config.exclude_external,
            max_depth: config.max_depth,
            ignore: builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap()),
        }
    }

    fn is_ignored(&self, path: &std::path::Path) -> bool {
        self.ignore.is_match(path)
    }

    fn has_tracked_extension(&self, path: &std::path::Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e.trim_start_matches('.') == ext),
            None => false,
        }
    }

    /// Recursively walks `root` in two passes: the first registers a node (with real
    /// on-disk size/mtime) for every tracked, non-ignored file; the second extracts and
    /// resolves references and adds edges. Two passes guarantee a forward reference to
    /// a file `WalkDir` hasn't reached yet still lands on that file's real node rather
    /// than `add_edge` skipping it or fabricating placeholder metadata (spec.md §4.3).
    /// Per-file read errors are collected in the returned report rather than aborting
    /// the scan.
    pub fn scan_project(&self, root: &FilePath, graph: &mut DependencyGraph) -> ScanReport {
        let mut report = ScanReport::default();
        let paths = self.discover(root);

        for path in &paths {
            report.files_scanned += 1;
            match std::fs::metadata(path.as_path()) {
                Ok(metadata) => {
                    let size = metadata.len();
                    let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    graph.add_node(path.clone(), size, mtime);
                }
                Err(e) => report.errors.push((path.clone(), IceError::io(path.clone(), e))),
            }
        }

        for path in &paths {
            if !graph.contains(path) {
                continue;
            }
            match self.extract_resolved(path) {
                Ok(dependencies) => {
                    for dep in &dependencies {
                        graph.add_edge(path, dep);
                    }
                }
                Err(e) => report.errors.push((path.clone(), e)),
            }
        }

        report
    }

    fn discover(&self, root: &FilePath) -> Vec<FilePath> {
        let walker = WalkDir::new(root.as_path())
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry.path()));

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_ignored(entry.path()) || !self.has_tracked_extension(entry.path()) {
                continue;
            }
            paths.push(FilePath::new(entry.path()));
        }
        paths
    }

    fn extract_resolved(&self, path: &FilePath) -> Result<HashSet<FilePath>, IceError> {
        let content = std::fs::read_to_string(path.as_path())
            .map_err(|e| IceError::io(path.clone(), e))?;
        let base_dir = path.parent().unwrap_or_else(|| path.clone());

        let references = filter_references(extract_references(&content), self.exclude_external);
        let resolved = references
            .iter()
            .filter_map(|r| resolve(r, &base_dir, &self.extensions))
            .collect();
        Ok(resolved)
    }

    /// Re-extracts references for a single already-scanned file and reconciles its
    /// forward edge set (stale edges removed, new ones added); other nodes are left
    /// untouched. Reverse edges stay consistent via `DependencyGraph::set_dependencies`.
    pub fn reparse_file(&self, path: &FilePath, graph: &mut DependencyGraph) -> Result<(), IceError> {
        let dependencies = self.extract_resolved(path)?;
        graph.set_dependencies(path, &dependencies);
        Ok(())
    }
}
