//! Structured engine configuration (spec.md §6). Not a CLI surface — the CLI binary
//! builds one of these from its own flags and hands it to `IceEngine`.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// File suffixes the analyzer considers, including the leading dot.
    pub extensions: Vec<String>,
    /// Glob patterns (globset syntax: `**`, `*`, `?`) skipped during scans.
    pub ignore_patterns: Vec<String>,
    /// Drop bare-specifier references when extracting imports.
    pub exclude_external: bool,
    /// Maximum directory-scan recursion depth.
    pub max_depth: usize,
    /// Updater permit count.
    pub max_concurrent_updates: usize,
    /// Per-file update timeout.
    pub update_timeout: Duration,
    /// Read-queue parallelism.
    pub max_concurrent_reads: usize,
    /// Read-queue backpressure bound.
    pub max_queue_size: usize,
    /// Coalescing window for reads/writes on the same path.
    pub batch_window: Duration,
    /// Max preload-cache entries.
    pub preload_cache_size: u64,
    /// Context cache entry bound.
    pub cache_max_entries: u64,
    /// Context cache byte bound.
    pub cache_max_bytes: u64,
    /// Retries per failed read.
    pub max_retries: u32,
    /// Spacing between retries.
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                ".ts".into(),
                ".tsx".into(),
                ".js".into(),
                ".jsx".into(),
                ".mjs".into(),
            ],
            ignore_patterns: vec![
                "**/*.test.*".into(),
                "**/*.spec.*".into(),
                "**/node_modules/**".into(),
                "**/.git/**".into(),
                "**/dist/**".into(),
                "**/build/**".into(),
            ],
            exclude_external: true,
            max_depth: 50,
            max_concurrent_updates: 5,
            update_timeout: Duration::from_millis(10_000),
            max_concurrent_reads: 10,
            max_queue_size: 1000,
            batch_window: Duration::from_millis(50),
            preload_cache_size: 100,
            cache_max_entries: 1000,
            cache_max_bytes: 1024 * 1024,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
    #[error("{field} must not be empty")]
    MustNotBeEmpty { field: &'static str },
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::MustNotBeEmpty { field: "extensions" });
        }
        if self.max_depth == 0 {
            return Err(ConfigError::MustBePositive { field: "max_depth" });
        }
        if self.max_concurrent_updates == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_concurrent_updates",
            });
        }
        if self.max_concurrent_reads == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_concurrent_reads",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_queue_size",
            });
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::MustBePositive {
                field: "cache_max_entries",
            });
        }
        if self.cache_max_bytes == 0 {
            return Err(ConfigError::MustBePositive {
                field: "cache_max_bytes",
            });
        }
        Ok(())
    }
}
