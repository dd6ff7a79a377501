//! Core data model shared across every component (spec.md §3).

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::IceError;

/// Absolute, normalized path identity used as the primary key across every component.
///
/// Normalization lowers `.`/`..` segments lexically at construction time; it never
/// touches the filesystem, so references that don't yet resolve to anything still get a
/// stable, comparable identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilePath(PathBuf);

impl FilePath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(normalize(path.as_ref()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn parent(&self) -> Option<FilePath> {
        self.0.parent().map(FilePath::new)
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> FilePath {
        FilePath::new(self.0.join(rel))
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.extension().and_then(|e| e.to_str())
    }

    pub fn to_string_lossy(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for FilePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for FilePath {
    fn from(p: PathBuf) -> Self {
        FilePath::new(p)
    }
}

/// Lexically normalize a path: drop `.` segments, pop on `..`, keep everything else.
/// Does not require the path to exist; a relative input is normalized relative to the
/// process's current directory so identity stays stable across calls.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_default()
            .join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Cached, content-hashed representation of one source file (spec.md §3).
#[derive(Debug, Clone)]
pub struct FileContext {
    pub content: Vec<u8>,
    pub hash: [u8; 16],
    pub mtime: SystemTime,
    pub size: u64,
}

impl FileContext {
    pub fn new(content: Vec<u8>, mtime: SystemTime) -> Self {
        let hash = md5::compute(&content).0;
        let size = content.len() as u64;
        Self {
            content,
            hash,
            mtime,
            size,
        }
    }

    pub fn hash_hex(&self) -> String {
        hex_encode(&self.hash)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A node in the dependency graph: a file plus its direct neighbors (spec.md §3).
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub path: FilePath,
    pub dependencies: HashSet<FilePath>,
    pub dependents: HashSet<FilePath>,
    pub size: u64,
    pub mtime: SystemTime,
}

impl DependencyNode {
    pub fn new(path: FilePath, size: u64, mtime: SystemTime) -> Self {
        Self {
            path,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            size,
            mtime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A reported strongly-connected component (or self-loop) in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicDependency {
    pub cycle: Vec<FilePath>,
    pub severity: Severity,
    pub description: String,
}

impl CyclicDependency {
    pub fn self_loop(path: FilePath) -> Self {
        let description = format!("{path} depends on itself");
        Self {
            cycle: vec![path],
            severity: Severity::Error,
            description,
        }
    }

    pub fn scc(cycle: Vec<FilePath>) -> Self {
        let description = format!(
            "cycle of {} files: {}",
            cycle.len(),
            cycle
                .iter()
                .map(|p| p.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Self {
            cycle,
            severity: Severity::Warning,
            description,
        }
    }
}

/// Kind of change a `ChangeSource` reports (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: FilePath,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: FilePath) -> Self {
        Self {
            kind,
            path,
            timestamp: SystemTime::now(),
        }
    }
}

/// Options governing one `processUpdate` call (spec.md §3).
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub use_cache: bool,
    pub skip_unchanged: bool,
    pub validate_cache: bool,
    pub optimize_order: bool,
    pub continue_on_error: bool,
    pub max_retries: u32,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            skip_unchanged: true,
            validate_cache: true,
            optimize_order: true,
            continue_on_error: true,
            max_retries: 3,
        }
    }
}

/// Tagged request variant driving the Incremental Updater (spec.md §3, §4.5).
#[derive(Debug, Clone)]
pub enum UpdateRequest {
    Single(FilePath),
    Batch(Vec<FilePath>),
    Cascade(FilePath),
    Smart(FilePath),
}

impl UpdateRequest {
    pub fn primary_path(&self) -> Option<&FilePath> {
        match self {
            UpdateRequest::Single(p) | UpdateRequest::Cascade(p) | UpdateRequest::Smart(p) => {
                Some(p)
            }
            UpdateRequest::Batch(_) => None,
        }
    }
}

/// Result of one `processUpdate` call (spec.md §3).
#[derive(Debug)]
pub struct UpdateResult {
    pub success: bool,
    pub updated_files: Vec<FilePath>,
    pub processed_count: usize,
    pub skipped_count: usize,
    pub cache_hit_count: usize,
    pub duration: Duration,
    pub update_order: Option<Vec<FilePath>>,
    pub errors: Vec<IceError>,
    pub warnings: Vec<String>,
}

impl UpdateResult {
    pub fn empty_success() -> Self {
        Self {
            success: true,
            updated_files: Vec::new(),
            processed_count: 0,
            skipped_count: 0,
            cache_hit_count: 0,
            duration: Duration::ZERO,
            update_order: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn destroyed() -> Self {
        Self {
            success: false,
            updated_files: Vec::new(),
            processed_count: 0,
            skipped_count: 0,
            cache_hit_count: 0,
            duration: Duration::ZERO,
            update_order: None,
            errors: vec![IceError::Destroyed],
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_segments() {
        let p = FilePath::new("/a/b/./c/../d");
        assert_eq!(p.as_path(), Path::new("/a/b/d"));
    }

    #[test]
    fn normalize_handles_leading_parent_gracefully() {
        let p = FilePath::new("/../a");
        assert_eq!(p.as_path(), Path::new("/a"));
    }

    #[test]
    fn file_context_hash_is_deterministic() {
        let a = FileContext::new(b"hello".to_vec(), SystemTime::now());
        let b = FileContext::new(b"hello".to_vec(), SystemTime::now());
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash_hex().len(), 32);
    }

    #[test]
    fn file_context_hash_changes_with_content() {
        let a = FileContext::new(b"hello".to_vec(), SystemTime::now());
        let b = FileContext::new(b"world".to_vec(), SystemTime::now());
        assert_ne!(a.hash, b.hash);
    }
}
