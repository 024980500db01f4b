// In: src/input.rs

//! Loads the input files into one contiguous, read-only buffer.
//!
//! Each file is memory-mapped and copied into the buffer in argument order, so
//! the pipeline sees a single byte slice regardless of how many files were
//! given. Any file that cannot be opened, stat'ed or mapped fails the whole
//! load before a single chunk is dispatched.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::RleError;

/// The concatenated bytes of every input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    bytes: Vec<u8>,
}

impl InputBuffer {
    /// Builds a buffer from bytes already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Reads and concatenates `paths` in order. No paths yields an empty buffer.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, RleError> {
        let mut bytes = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let added = append_file(path, &mut bytes)?;
            log::debug!("loaded {} bytes from '{}'", added, path.display());
        }

        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn input_error(path: &Path) -> impl FnOnce(std::io::Error) -> RleError + '_ {
    move |source| RleError::InputAccess {
        path: PathBuf::from(path),
        source,
    }
}

/// Appends the contents of `path` to `bytes`, returning how many bytes it added.
fn append_file(path: &Path, bytes: &mut Vec<u8>) -> Result<usize, RleError> {
    let file = File::open(path).map_err(input_error(path))?;
    let metadata = file.metadata().map_err(input_error(path))?;

    if metadata.is_dir() {
        return Err(RleError::InputAccess {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
        });
    }
    if metadata.len() == 0 {
        // Zero-length files cannot be mapped on every platform.
        return Ok(0);
    }

    // SAFETY: the map is read-only and dropped before this function returns;
    // its contents are copied out immediately.
    let map = unsafe { Mmap::map(&file) }.map_err(input_error(path))?;
    bytes.try_reserve(map.len())?;
    bytes.extend_from_slice(&map);
    Ok(map.len())
}
