//! This module contains the pure, stateless kernels for byte-oriented Run-Length
//! Encoding (RLE) and its verification decoder.
//!
//! The wire format is a flat sequence of `(value, run_length)` byte pairs. The
//! run length is a single byte, so a run longer than 255 is emitted as several
//! consecutive pairs carrying the same value. Adjacent pairs with the same value
//! are legal and decode to one longer run; this is what happens at chunk
//! boundaries, since chunks are encoded independently.

use std::io::Write;

use crate::error::RleError;

/// The longest run a single `EncodedRun` can describe.
pub const MAX_RUN_LENGTH: u8 = u8::MAX;

/// Serialized size of one `EncodedRun`: a payload byte followed by a count byte.
pub const ENCODED_RUN_SIZE: usize = 2;

/// One `(byte value, run length)` pair. `length` is always in `1..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedRun {
    pub value: u8,
    pub length: u8,
}

impl EncodedRun {
    pub fn new(value: u8, length: u8) -> Self {
        Self { value, length }
    }

    /// The serialized form: payload byte first, then the count.
    pub fn to_bytes(self) -> [u8; ENCODED_RUN_SIZE] {
        [self.value, self.length]
    }
}

//==================================================================================
// 1. Public API
//==================================================================================

/// Encodes `input_slice` into `output_buf`, replacing its contents.
///
/// Runs are flushed when the byte changes or the count reaches
/// `MAX_RUN_LENGTH`; the final run is flushed unconditionally. An empty slice
/// produces no runs. The only failure is an allocation failure while growing
/// `output_buf`.
pub fn encode(input_slice: &[u8], output_buf: &mut Vec<EncodedRun>) -> Result<(), RleError> {
    output_buf.clear();

    let Some((&first, rest)) = input_slice.split_first() else {
        return Ok(());
    };

    let mut current_val = first;
    let mut run_count: u8 = 1;

    for &val in rest {
        if val == current_val && run_count < MAX_RUN_LENGTH {
            run_count += 1;
        } else {
            push_run(output_buf, current_val, run_count)?;
            current_val = val;
            run_count = 1;
        }
    }

    push_run(output_buf, current_val, run_count)
}

/// Appends the serialized form of `runs` to `output_buf`.
pub fn serialize_runs(runs: &[EncodedRun], output_buf: &mut Vec<u8>) -> Result<(), RleError> {
    output_buf.try_reserve(runs.len() * ENCODED_RUN_SIZE)?;
    for run in runs {
        output_buf.extend_from_slice(&run.to_bytes());
    }
    Ok(())
}

/// Writes the serialized form of `runs` to `writer` with a single `write_all`.
pub fn write_runs<W: Write + ?Sized>(runs: &[EncodedRun], writer: &mut W) -> Result<usize, RleError> {
    let mut bytes = Vec::new();
    serialize_runs(runs, &mut bytes)?;
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Decodes a serialized run stream into `output_buf`, replacing its contents.
pub fn decode(input_bytes: &[u8], output_buf: &mut Vec<u8>) -> Result<(), RleError> {
    output_buf.clear();

    if input_bytes.len() % ENCODED_RUN_SIZE != 0 {
        return Err(RleError::RleDecodeError(format!(
            "Truncated buffer: {} bytes is not a whole number of runs",
            input_bytes.len()
        )));
    }

    for (i, pair) in input_bytes.chunks_exact(ENCODED_RUN_SIZE).enumerate() {
        let (value, length) = (pair[0], pair[1]);
        if length == 0 {
            return Err(RleError::RleDecodeError(format!(
                "Run {} has a zero length",
                i
            )));
        }
        output_buf.try_reserve(length as usize)?;
        output_buf.extend(std::iter::repeat(value).take(length as usize));
    }

    Ok(())
}

/// Total number of bytes `runs` decode to.
pub fn decoded_len(runs: &[EncodedRun]) -> usize {
    runs.iter().map(|run| run.length as usize).sum()
}

/// Checks, without allocating, that `runs` decode exactly to `original`.
pub fn matches(runs: &[EncodedRun], original: &[u8]) -> bool {
    let mut rest = original;
    for run in runs {
        let len = run.length as usize;
        if len == 0 || rest.len() < len {
            return false;
        }
        let (head, tail) = rest.split_at(len);
        if head.iter().any(|&b| b != run.value) {
            return false;
        }
        rest = tail;
    }
    rest.is_empty()
}

//==================================================================================
// 2. Internal Helpers
//==================================================================================

fn push_run(output_buf: &mut Vec<EncodedRun>, value: u8, length: u8) -> Result<(), RleError> {
    output_buf.try_reserve(1)?;
    output_buf.push(EncodedRun::new(value, length));
    Ok(())
}

//==================================================================================
// 3. Unit Tests
//==================================================================================
