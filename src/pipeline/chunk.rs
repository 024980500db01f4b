// In: src/pipeline/chunk.rs

//! Value types that flow through the pipeline: the `Chunk` work item, the
//! `ChunkResult` a worker produces for it, and the `ChunkPlan` that splits an
//! input of a given length into chunks.

use std::ops::Range;

use crate::error::RleError;
use crate::kernels::EncodedRun;

/// A contiguous slice of the input buffer, described by position only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub offset: usize,
    pub length: usize,
}

impl Chunk {
    /// The byte range this chunk covers in the input buffer.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

/// The encoded form of exactly one `Chunk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub index: usize,
    pub encoded: Vec<EncodedRun>,
}

/// The ordered chunk boundaries for an input of `total_len` bytes.
///
/// Chunks are numbered from 0 in increasing offset order and cover the input
/// exactly; only the last one may be shorter than `chunk_size`. An empty input
/// has no chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_len: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(total_len: usize, chunk_size: usize) -> Result<Self, RleError> {
        if chunk_size == 0 {
            return Err(RleError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(Self {
            total_len,
            chunk_size,
        })
    }

    /// Number of chunks in the plan.
    pub fn len(&self) -> usize {
        self.total_len.div_ceil(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.total_len)
            .step_by(self.chunk_size)
            .enumerate()
            .map(move |(index, offset)| Chunk {
                index,
                offset,
                length: self.chunk_size.min(self.total_len - offset),
            })
    }
}
