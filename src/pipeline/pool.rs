// In: src/pipeline/pool.rs

//! The fixed-size pool of worker threads that turns chunks into chunk results.
//!
//! Workers are scoped threads: they borrow the input buffer, the task queue and
//! the sequencer from the driver's stack frame, so none of them needs to be
//! reference counted or copied. Every worker runs the same loop:
//!
//!   take() -> encode the chunk's slice -> sequencer.deposit(result)
//!
//! until the queue reports shutdown. A failing encode or deposit (or a panic)
//! records the error on the sequencer and aborts the queue, which stops the
//! other workers and unblocks the driver if it is waiting on a full queue.

use std::io::Write;
use std::mem;
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::error::RleError;
use crate::kernels::rle;
use crate::pipeline::chunk::{Chunk, ChunkResult};
use crate::pipeline::queue::{Task, TaskQueue};
use crate::pipeline::sequencer::Sequencer;

//==================================================================================
// 1. The Encoding Seam
//==================================================================================

/// Turns one chunk of input into its encoded result.
///
/// Implementations are shared by every worker, so they must be `Sync`.
pub trait ChunkEncoder: Sync {
    fn encode_chunk(&self, chunk: &Chunk, bytes: &[u8]) -> Result<ChunkResult, RleError>;
}

/// The production encoder: the byte RLE kernel, optionally followed by a check
/// that the runs decode back to the source slice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleChunkEncoder {
    pub verify: bool,
}

impl RleChunkEncoder {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }
}

impl ChunkEncoder for RleChunkEncoder {
    fn encode_chunk(&self, chunk: &Chunk, bytes: &[u8]) -> Result<ChunkResult, RleError> {
        let mut encoded = Vec::new();
        rle::encode(bytes, &mut encoded)?;

        if self.verify && !rle::matches(&encoded, bytes) {
            return Err(RleError::EncodingInvariant {
                index: chunk.index,
                offset: chunk.offset,
                length: chunk.length,
                reason: format!(
                    "{} runs decode to {} bytes that differ from the source",
                    encoded.len(),
                    rle::decoded_len(&encoded)
                ),
            });
        }

        Ok(ChunkResult {
            index: chunk.index,
            encoded,
        })
    }
}

//==================================================================================
// 2. The Worker Pool
//==================================================================================

pub struct WorkerPool<'scope> {
    queue: &'scope TaskQueue,
    handles: Vec<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope> WorkerPool<'scope> {
    /// Spawns `workers` threads inside `scope`. All of them are running before
    /// this returns.
    ///
    /// If a spawn fails, the threads started so far are shut down and joined and
    /// the spawn error is returned.
    pub fn spawn<'env, W, E>(
        scope: &'scope Scope<'scope, 'env>,
        workers: usize,
        queue: &'scope TaskQueue,
        input: &'scope [u8],
        sequencer: &'scope Sequencer<W>,
        encoder: &'scope E,
    ) -> Result<Self, RleError>
    where
        W: Write + Send,
        E: ChunkEncoder + ?Sized,
    {
        let mut pool = WorkerPool {
            queue,
            handles: Vec::with_capacity(workers),
        };

        for id in 0..workers {
            let spawned = thread::Builder::new()
                .name(format!("rle-worker-{}", id))
                .spawn_scoped(scope, move || {
                    worker_loop(id, queue, input, sequencer, encoder)
                });

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(err) => {
                    log::debug!("failed to spawn worker {}: {}", id, err);
                    // Joining here cannot report anything more useful than the
                    // spawn error itself.
                    let _ = pool.join();
                    return Err(RleError::Io(err));
                }
            }
        }

        log::debug!("spawned {} workers", workers);
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Shuts the queue down and joins every worker.
    ///
    /// All workers are joined even if some of them panicked; the first panic is
    /// reported as `WorkerPanicked`.
    pub fn join(mut self) -> Result<(), RleError> {
        self.queue.shutdown();

        let mut outcome = Ok(());
        for (id, handle) in mem::take(&mut self.handles).into_iter().enumerate() {
            if handle.join().is_err() && outcome.is_ok() {
                outcome = Err(RleError::WorkerPanicked(id));
            }
        }
        log::debug!("worker pool joined");
        outcome
    }
}

impl Drop for WorkerPool<'_> {
    fn drop(&mut self) {
        // The enclosing scope joins any handles still held here; make sure the
        // workers can actually exit.
        if !self.handles.is_empty() {
            self.queue.shutdown();
        }
    }
}

/// Fails the run if the worker unwinds, so a panic cannot leave the driver
/// blocked on a full queue, or other workers blocked on the reorder window.
struct PanicGuard<'a, W: Write> {
    id: usize,
    queue: &'a TaskQueue,
    sequencer: &'a Sequencer<W>,
}

impl<W: Write> Drop for PanicGuard<'_, W> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.sequencer.fail(RleError::WorkerPanicked(self.id));
            self.queue.abort();
        }
    }
}

fn worker_loop<W, E>(
    id: usize,
    queue: &TaskQueue,
    input: &[u8],
    sequencer: &Sequencer<W>,
    encoder: &E,
) where
    W: Write,
    E: ChunkEncoder + ?Sized,
{
    let _guard = PanicGuard {
        id,
        queue,
        sequencer,
    };
    let mut processed = 0usize;

    while let Task::Chunk(chunk) = queue.take() {
        let outcome = input
            .get(chunk.range())
            .ok_or_else(|| RleError::EncodingInvariant {
                index: chunk.index,
                offset: chunk.offset,
                length: chunk.length,
                reason: format!("chunk lies outside the {}-byte input", input.len()),
            })
            .and_then(|bytes| encoder.encode_chunk(&chunk, bytes))
            .and_then(|result| {
                log::trace!(
                    "worker {} encoded chunk {} into {} runs",
                    id,
                    chunk.index,
                    result.encoded.len()
                );
                sequencer.deposit(result)
            });

        if let Err(err) = outcome {
            log::debug!("worker {} failed on chunk {}: {}", id, chunk.index, err);
            sequencer.fail(err);
            queue.abort();
            break;
        }
        processed += 1;
    }

    log::trace!("worker {} exiting after {} chunks", id, processed);
}

//==================================================================================
// 3. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::EncodedRun;

    #[test]
    fn test_rle_chunk_encoder_wraps_kernel_output() {
        let encoder = RleChunkEncoder::new(true);
        let chunk = Chunk {
            index: 7,
            offset: 28,
            length: 4,
        };
        let result = encoder.encode_chunk(&chunk, b"aabb").unwrap();
        assert_eq!(result.index, 7);
        assert_eq!(
            result.encoded,
            vec![EncodedRun::new(b'a', 2), EncodedRun::new(b'b', 2)]
        );
    }

    #[test]
    fn test_pool_processes_every_chunk() {
        let input: Vec<u8> = (0..100u8).flat_map(|b| [b, b, b]).collect();
        let queue = TaskQueue::with_capacity(2);
        let sequencer = Sequencer::new(Vec::new());
        let encoder = RleChunkEncoder::default();
        let chunks = crate::pipeline::chunk::ChunkPlan::new(input.len(), 3).unwrap();

        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 3, &queue, &input, &sequencer, &encoder).unwrap();
            assert_eq!(pool.size(), 3);
            for chunk in chunks.iter() {
                queue.submit(chunk).unwrap();
            }
            pool.join().unwrap();
        });

        sequencer.await_completion(chunks.len()).unwrap();
        let (sink, stats) = sequencer.finish().unwrap();
        assert_eq!(stats.chunks_emitted, 100);
        let expected: Vec<u8> = (0..100u8).flat_map(|b| [b, 3]).collect();
        assert_eq!(sink, expected);
    }

    #[test]
    fn test_out_of_range_chunk_fails_and_aborts_queue() {
        let input = b"abc".to_vec();
        let queue = TaskQueue::with_capacity(1);
        let sequencer = Sequencer::new(Vec::new());
        let encoder = RleChunkEncoder::default();

        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 1, &queue, &input, &sequencer, &encoder).unwrap();
            queue
                .submit(Chunk {
                    index: 0,
                    offset: 2,
                    length: 5,
                })
                .unwrap();
            pool.join().unwrap();
        });

        assert!(queue.is_aborted());
        assert!(matches!(
            sequencer.take_failure(),
            Some(RleError::EncodingInvariant { index: 0, .. })
        ));
    }

    struct PanickingEncoder;

    impl ChunkEncoder for PanickingEncoder {
        fn encode_chunk(&self, _chunk: &Chunk, _bytes: &[u8]) -> Result<ChunkResult, RleError> {
            panic!("encoder blew up");
        }
    }

    #[test]
    fn test_worker_panic_is_reported_and_aborts_queue() {
        let input = vec![0u8; 8];
        let queue = TaskQueue::with_capacity(1);
        let sequencer = Sequencer::new(Vec::new());

        thread::scope(|s| {
            let pool =
                WorkerPool::spawn(s, 1, &queue, &input, &sequencer, &PanickingEncoder).unwrap();
            queue
                .submit(Chunk {
                    index: 0,
                    offset: 0,
                    length: 8,
                })
                .unwrap();
            assert!(matches!(pool.join(), Err(RleError::WorkerPanicked(0))));
        });

        assert!(queue.is_aborted());
        assert!(matches!(
            sequencer.take_failure(),
            Some(RleError::WorkerPanicked(0))
        ));
    }

    #[test]
    fn test_dropping_pool_lets_scope_finish() {
        let input: Vec<u8> = Vec::new();
        let queue = TaskQueue::with_capacity(1);
        let sequencer = Sequencer::new(Vec::new());
        let encoder = RleChunkEncoder::default();

        thread::scope(|s| {
            let _pool = WorkerPool::spawn(s, 2, &queue, &input, &sequencer, &encoder).unwrap();
        });

        assert_eq!(queue.take(), Task::Shutdown);
    }
}
