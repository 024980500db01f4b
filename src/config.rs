// In: src/config.rs

//! The single source of truth for all rlepipe run configuration.
//!
//! `RleConfig` is created once at the application boundary (built-in defaults,
//! optionally overlaid by a JSON file and then by command-line flags) and then
//! passed down to the pipeline as a shared, read-only `Arc<RleConfig>`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::RleError;

//==================================================================================
// I. The Unified RleConfig
//==================================================================================

/// Settings that shape a single encoding run.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RleConfig {
    /// Number of worker threads encoding chunks in parallel. Must be at least 1.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Maximum number of input bytes per chunk (the last chunk may be shorter).
    /// Smaller chunks spread work more evenly at the cost of more queue traffic.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capacity of the task queue. `None` means twice the thread count, which
    /// keeps every worker fed without letting the dispatcher run far ahead.
    #[serde(default)]
    pub queue_depth: Option<usize>,

    /// If true, every worker checks its encoded runs against the source slice
    /// before handing the result over.
    #[serde(default)]
    pub verify_chunks: bool,
}

impl Default for RleConfig {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            chunk_size: default_chunk_size(),
            queue_depth: None,
            verify_chunks: false,
        }
    }
}

impl RleConfig {
    /// Reads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, RleError> {
        let text = fs::read_to_string(path).map_err(|source| RleError::InputAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The effective task queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_depth
            .unwrap_or_else(|| self.thread_count.saturating_mul(2))
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RleError> {
        if self.thread_count == 0 {
            return Err(RleError::Config(
                "thread_count must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(RleError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.queue_depth == Some(0) {
            return Err(RleError::Config("queue_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Helper for `serde` to provide a default for `thread_count`.
fn default_thread_count() -> usize {
    1
}

/// Helper for `serde` to provide a default for `chunk_size`.
fn default_chunk_size() -> usize {
    4096
}

//==================================================================================
// II. Unit Tests
//==================================================================================
