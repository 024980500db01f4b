// In: src/pipeline/sequencer.rs

//! The reorder buffer between the worker pool and the output sink.
//!
//! Workers finish chunks in any order and call `deposit`. The sequencer keeps
//! results that arrived early in a map keyed by chunk index and writes to the
//! sink only when the next expected index is present, so the emitted stream is
//! always in chunk order. All state, the sink included, sits behind one mutex:
//! workers never write output themselves.
//!
//! A sequencer built `with_window(sink, n)` also bounds how far ahead of the
//! emission point a result may be: a deposit for an index `n` or more past the
//! next expected one blocks until emission catches up. The chunk at the next
//! expected index is always held by a worker that is not blocked (the queue is
//! FIFO), so the window can always advance, and at most `n` results are ever
//! held back.
//!
//! The driver uses `await_completion` as its completion barrier. It returns once
//! every chunk has been emitted, a failure was recorded, or the sequencer was
//! sealed (no more producers) with chunks still missing.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::RleError;
use crate::kernels::rle;
use crate::pipeline::chunk::ChunkResult;

/// Counters describing what the sequencer has emitted so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub chunks_emitted: usize,
    pub runs_emitted: u64,
    pub bytes_written: u64,
    /// High-water mark of results held back waiting for a predecessor.
    pub peak_pending: usize,
}

struct SequencerState<W> {
    sink: W,
    window: usize,
    next_index: usize,
    pending: BTreeMap<usize, ChunkResult>,
    stats: SequencerStats,
    failure: Option<RleError>,
    sealed: bool,
}

pub struct Sequencer<W> {
    state: Mutex<SequencerState<W>>,
    progress: Condvar,
}

impl<W: Write> Sequencer<W> {
    /// A sequencer with an unbounded reorder window.
    pub fn new(sink: W) -> Self {
        Self::with_window(sink, usize::MAX)
    }

    /// A sequencer that holds back at most `window` results (at least one).
    pub fn with_window(sink: W, window: usize) -> Self {
        Self {
            state: Mutex::new(SequencerState {
                sink,
                window: window.max(1),
                next_index: 0,
                pending: BTreeMap::new(),
                stats: SequencerStats::default(),
                failure: None,
                sealed: false,
            }),
            progress: Condvar::new(),
        }
    }

    /// Accepts one chunk result and emits every result that is now in order.
    ///
    /// Blocks while `result` lies beyond the reorder window. Results deposited
    /// after a failure was recorded are discarded. A stale or duplicate index
    /// is an `InternalError`; a sink write failure is returned as is. Either
    /// way the caller is expected to pass the error to `fail`.
    pub fn deposit(&self, result: ChunkResult) -> Result<(), RleError> {
        let index = result.index;
        let mut state = self.lock();
        while state.failure.is_none()
            && index >= state.next_index.saturating_add(state.window)
        {
            state = self
                .progress
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.failure.is_some() {
            return Ok(());
        }

        if index < state.next_index || state.pending.contains_key(&index) {
            return Err(RleError::InternalError(format!(
                "chunk {} deposited twice",
                index
            )));
        }

        state.pending.insert(index, result);
        state.stats.peak_pending = state.stats.peak_pending.max(state.pending.len());

        let emitted = state.emit_ready()?;
        drop(state);
        if emitted > 0 {
            self.progress.notify_all();
        }
        Ok(())
    }

    /// Records the first failure of the run and wakes the driver.
    pub fn fail(&self, err: RleError) {
        let mut state = self.lock();
        if state.failure.is_none() {
            state.failure = Some(err);
        } else {
            log::debug!("sequencer already failed; dropping later error: {}", err);
        }
        drop(state);
        self.progress.notify_all();
    }

    pub fn has_failed(&self) -> bool {
        self.lock().failure.is_some()
    }

    /// Removes and returns the recorded failure, if any.
    pub fn take_failure(&self) -> Option<RleError> {
        self.lock().failure.take()
    }

    /// Declares that no further deposits will arrive.
    pub fn seal(&self) {
        self.lock().sealed = true;
        self.progress.notify_all();
    }

    /// Blocks until `total_chunks` chunks have been emitted.
    ///
    /// Returns early with the recorded failure, or with an `InternalError` if the
    /// sequencer is sealed while chunks are still missing.
    pub fn await_completion(&self, total_chunks: usize) -> Result<(), RleError> {
        let mut state = self.lock();
        while state.next_index < total_chunks && state.failure.is_none() && !state.sealed {
            state = self
                .progress
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if let Some(err) = state.failure.take() {
            return Err(err);
        }
        if state.next_index < total_chunks {
            return Err(RleError::InternalError(format!(
                "sequencer stopped at chunk {} of {} ({} results still pending)",
                state.next_index,
                total_chunks,
                state.pending.len()
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> SequencerStats {
        self.lock().stats
    }

    /// Number of results currently held back.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Flushes the sink and hands it back.
    pub fn finish(self) -> Result<(W, SequencerStats), RleError> {
        let mut state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        state.sink.flush()?;
        Ok((state.sink, state.stats))
    }

    fn lock(&self) -> MutexGuard<'_, SequencerState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write> SequencerState<W> {
    /// Writes out the contiguous run of results starting at `next_index`.
    fn emit_ready(&mut self) -> Result<usize, RleError> {
        let mut emitted = 0;
        while let Some(result) = self.pending.remove(&self.next_index) {
            let written = rle::write_runs(&result.encoded, &mut self.sink)?;
            log::trace!(
                "emitted chunk {} ({} runs, {} bytes)",
                result.index,
                result.encoded.len(),
                written
            );
            self.stats.bytes_written += written as u64;
            self.stats.runs_emitted += result.encoded.len() as u64;
            self.stats.chunks_emitted += 1;
            self.next_index += 1;
            emitted += 1;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::EncodedRun;
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn result(index: usize, value: u8) -> ChunkResult {
        ChunkResult {
            index,
            encoded: vec![EncodedRun::new(value, 1)],
        }
    }

    #[test]
    fn test_in_order_deposits_emit_immediately() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.deposit(result(0, b'a')).unwrap();
        assert_eq!(sequencer.pending_len(), 0);
        sequencer.deposit(result(1, b'b')).unwrap();
        sequencer.await_completion(2).unwrap();

        let (sink, stats) = sequencer.finish().unwrap();
        assert_eq!(sink, vec![b'a', 1, b'b', 1]);
        assert_eq!(stats.chunks_emitted, 2);
        assert_eq!(stats.bytes_written, 4);
        assert_eq!(stats.peak_pending, 1);
    }

    #[test]
    fn test_out_of_order_results_are_held_back() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.deposit(result(2, b'c')).unwrap();
        sequencer.deposit(result(1, b'b')).unwrap();
        assert_eq!(sequencer.pending_len(), 2);
        assert_eq!(sequencer.stats().bytes_written, 0);

        sequencer.deposit(result(0, b'a')).unwrap();
        assert_eq!(sequencer.pending_len(), 0);
        sequencer.await_completion(3).unwrap();

        let (sink, stats) = sequencer.finish().unwrap();
        assert_eq!(sink, vec![b'a', 1, b'b', 1, b'c', 1]);
        assert_eq!(stats.peak_pending, 3);
    }

    #[test]
    fn test_window_blocks_results_too_far_ahead() {
        let sequencer = Sequencer::with_window(Vec::new(), 2);
        sequencer.deposit(result(1, b'b')).unwrap();

        thread::scope(|s| {
            let ahead = s.spawn(|| sequencer.deposit(result(2, b'c')));
            thread::sleep(Duration::from_millis(30));
            assert!(!ahead.is_finished());
            assert_eq!(sequencer.pending_len(), 1);

            sequencer.deposit(result(0, b'a')).unwrap();
            ahead.join().unwrap().unwrap();
        });

        sequencer.await_completion(3).unwrap();
        let (sink, stats) = sequencer.finish().unwrap();
        assert_eq!(sink, vec![b'a', 1, b'b', 1, b'c', 1]);
        assert!(stats.peak_pending <= 2);
    }

    #[test]
    fn test_failure_releases_blocked_depositor() {
        let sequencer = Sequencer::with_window(Vec::new(), 1);
        thread::scope(|s| {
            let ahead = s.spawn(|| sequencer.deposit(result(5, b'f')));
            thread::sleep(Duration::from_millis(20));
            sequencer.fail(RleError::QueueClosed);
            assert!(ahead.join().unwrap().is_ok());
        });
        assert_eq!(sequencer.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.deposit(result(0, b'a')).unwrap();
        assert!(matches!(
            sequencer.deposit(result(0, b'a')),
            Err(RleError::InternalError(_))
        ));

        sequencer.deposit(result(2, b'c')).unwrap();
        assert!(matches!(
            sequencer.deposit(result(2, b'c')),
            Err(RleError::InternalError(_))
        ));
    }

    #[test]
    fn test_zero_chunks_completes_immediately() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.await_completion(0).unwrap();
        let (sink, _) = sequencer.finish().unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_sealed_with_missing_chunk_is_an_error() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.deposit(result(1, b'b')).unwrap();
        sequencer.seal();
        let err = sequencer.await_completion(2).unwrap_err();
        assert!(matches!(err, RleError::InternalError(_)));
    }

    #[test]
    fn test_first_failure_wins_and_later_deposits_are_dropped() {
        let sequencer = Sequencer::new(Vec::new());
        sequencer.fail(RleError::QueueClosed);
        sequencer.fail(RleError::WorkerPanicked(3));
        sequencer.deposit(result(0, b'a')).unwrap();

        assert!(sequencer.has_failed());
        assert!(matches!(
            sequencer.await_completion(1),
            Err(RleError::QueueClosed)
        ));
        let (sink, _) = sequencer.finish().unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_await_wakes_on_concurrent_deposits() {
        let sequencer = Arc::new(Sequencer::new(Vec::new()));
        let worker = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || {
                for index in (0..5).rev() {
                    thread::sleep(Duration::from_millis(5));
                    sequencer.deposit(result(index, index as u8)).unwrap();
                }
            })
        };

        sequencer.await_completion(5).unwrap();
        worker.join().unwrap();

        let sequencer = Arc::try_unwrap(sequencer).ok().unwrap();
        let (sink, _) = sequencer.finish().unwrap();
        assert_eq!(sink, vec![0, 1, 1, 1, 2, 1, 3, 1, 4, 1]);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_error_is_returned_from_deposit() {
        let sequencer = Sequencer::new(BrokenPipe);
        let err = sequencer.deposit(result(0, b'a')).unwrap_err();
        assert!(matches!(err, RleError::Io(_)));
    }
}
