//! This file is the root of the `rlepipe` crate.
//!
//! `rlepipe` run-length encodes the concatenation of one or more input files.
//! The input is split into fixed-size chunks that a pool of worker threads
//! encodes in parallel; a sequencer writes the results back in chunk order, so
//! the output is identical for every thread count.
//!
//! Its responsibilities are strictly limited to declaring the modules of the
//! library and re-exporting the handful of types the binary and callers need.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod kernels;
pub mod pipeline;

//==================================================================================
// 2. Re-exports
//==================================================================================
pub use config::RleConfig;
pub use error::RleError;
pub use input::InputBuffer;
pub use kernels::{EncodedRun, MAX_RUN_LENGTH};
pub use pipeline::{PipelineDriver, RunSummary};
