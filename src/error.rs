// In: src/error.rs

//! This module defines the single, unified error type for the entire rlepipe crate.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RleError {
    // =========================================================================
    // === High-Level, Semantic Errors (Specific to the encoding pipeline)
    // =========================================================================
    /// An input file could not be opened, stat'ed or mapped.
    #[error("cannot read input '{}': {source}", .path.display())]
    InputAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("memory allocation failed: {0}")]
    Allocation(String),

    #[error(
        "chunk {index} (offset {offset}, length {length}) failed verification: {reason}"
    )]
    EncodingInvariant {
        index: usize,
        offset: usize,
        length: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("task queue closed before all chunks were dispatched")]
    QueueClosed,

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error from the output sink (e.g., a closed pipe on stdout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, raised while reading a config file.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    // =========================================================================
    // === Low-Level Kernel Errors
    // =========================================================================
    #[error("RLE decoding error: {0}")]
    RleDecodeError(String),
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<TryReserveError> for RleError {
    fn from(err: TryReserveError) -> Self {
        RleError::Allocation(err.to_string())
    }
}
