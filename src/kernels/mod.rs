//! This module collects the pure, stateless byte kernels used by the pipeline.
//!
//! Kernels never touch shared state, so the pipeline may call them concurrently
//! on disjoint slices of the input.

/// Byte-oriented run-length encoding with an 8-bit count.
pub mod rle;

pub use rle::{EncodedRun, MAX_RUN_LENGTH};
