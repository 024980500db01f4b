// In: src/pipeline/driver.rs

//! The top-level coordinator for one encoding run.
//!
//! A run moves through `Loading -> Dispatching -> Draining -> Done`, or ends in
//! `Failed`. The driver owns the input buffer for the whole run, spawns the
//! worker pool before the first chunk is submitted, and joins every worker
//! before it returns, whether the run succeeded or not.

use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::RleConfig;
use crate::error::RleError;
use crate::input::InputBuffer;
use crate::pipeline::chunk::ChunkPlan;
use crate::pipeline::pool::{ChunkEncoder, RleChunkEncoder, WorkerPool};
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::sequencer::{Sequencer, SequencerStats};

/// The lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Loading,
    Dispatching,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Loading => "loading",
            PipelineState::Dispatching => "dispatching",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub input_bytes: usize,
    pub chunks: usize,
    pub workers: usize,
    pub runs: u64,
    pub output_bytes: u64,
    pub peak_pending: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "encoded {} bytes in {} chunks on {} workers into {} runs ({} bytes), peak pending {}, {:.3}s",
            self.input_bytes,
            self.chunks,
            self.workers,
            self.runs,
            self.output_bytes,
            self.peak_pending,
            self.elapsed.as_secs_f64()
        )
    }
}

pub struct PipelineDriver<E = RleChunkEncoder> {
    config: Arc<RleConfig>,
    encoder: E,
}

impl PipelineDriver<RleChunkEncoder> {
    /// A driver using the byte RLE kernel, verifying chunks if the config asks.
    pub fn new(config: Arc<RleConfig>) -> Self {
        let encoder = RleChunkEncoder::new(config.verify_chunks);
        Self { config, encoder }
    }
}

impl<E: ChunkEncoder> PipelineDriver<E> {
    /// A driver using a custom chunk encoder.
    pub fn with_encoder(config: Arc<RleConfig>, encoder: E) -> Self {
        Self { config, encoder }
    }

    pub fn config(&self) -> &RleConfig {
        &self.config
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Loads `paths` and encodes their concatenation into `sink`.
    ///
    /// A file error fails the run before any worker is started, so nothing is
    /// written to `sink`.
    pub fn run_files<P, W>(&self, paths: &[P], sink: W) -> Result<(W, RunSummary), RleError>
    where
        P: AsRef<Path>,
        W: Write + Send,
    {
        let input = load(paths)?;
        self.run(&input, sink)
    }

    /// Like `run_files`, but writes through a `BufWriter` over `out` that is
    /// only flushed if the run succeeds.
    pub fn run_files_buffered<P, W>(&self, paths: &[P], out: W) -> Result<(W, RunSummary), RleError>
    where
        P: AsRef<Path>,
        W: Write + Send,
    {
        let input = load(paths)?;
        self.run_buffered(&input, out)
    }

    /// Encodes `input` through a `BufWriter` over `out`.
    ///
    /// On failure the bytes still sitting in the buffer are discarded rather
    /// than flushed on drop; only output the buffer had already passed on
    /// before the failure reaches `out`.
    pub fn run_buffered<W: Write + Send>(
        &self,
        input: &InputBuffer,
        out: W,
    ) -> Result<(W, RunSummary), RleError> {
        let mut writer = BufWriter::new(out);
        let outcome = self.run(input, &mut writer).map(|(_, summary)| summary);

        match outcome {
            Ok(summary) => {
                let out = writer
                    .into_inner()
                    .map_err(|err| RleError::Io(err.into_error()))?;
                Ok((out, summary))
            }
            Err(err) => {
                let (_out, unflushed) = writer.into_parts();
                if let Ok(unflushed) = unflushed {
                    log::debug!("discarding {} buffered output bytes", unflushed.len());
                }
                Err(err)
            }
        }
    }

    /// Encodes an already loaded buffer into `sink`, returning the flushed sink.
    ///
    /// On failure `sink` is dropped as is; a buffering sink owned by value will
    /// flush on drop, so use `run_buffered` when that must not happen.
    pub fn run<W: Write + Send>(
        &self,
        input: &InputBuffer,
        sink: W,
    ) -> Result<(W, RunSummary), RleError> {
        let started = Instant::now();
        let outcome = self.config.validate().and_then(|()| self.encode(input, sink));

        match outcome {
            Ok((sink, stats, chunks)) => {
                transition(PipelineState::Done);
                let summary = RunSummary {
                    input_bytes: input.len(),
                    chunks,
                    workers: self.config.thread_count,
                    runs: stats.runs_emitted,
                    output_bytes: stats.bytes_written,
                    peak_pending: stats.peak_pending,
                    elapsed: started.elapsed(),
                };
                log::info!("{}", summary);
                Ok((sink, summary))
            }
            Err(err) => {
                transition(PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn encode<W: Write + Send>(
        &self,
        input: &InputBuffer,
        sink: W,
    ) -> Result<(W, SequencerStats, usize), RleError> {
        let plan = ChunkPlan::new(input.len(), self.config.chunk_size)?;
        let queue = TaskQueue::with_capacity(self.config.queue_capacity());
        let sequencer = Sequencer::with_window(sink, self.config.thread_count);
        let encoder = &self.encoder;

        log::debug!(
            "{} bytes -> {} chunks of up to {} bytes, {} workers, queue depth {}",
            input.len(),
            plan.len(),
            plan.chunk_size(),
            self.config.thread_count,
            queue.capacity()
        );

        thread::scope(|scope| -> Result<(), RleError> {
            let pool = WorkerPool::spawn(
                scope,
                self.config.thread_count,
                &queue,
                input.as_bytes(),
                &sequencer,
                encoder,
            )?;

            transition(PipelineState::Dispatching);
            let dispatched = dispatch(&queue, &plan);

            transition(PipelineState::Draining);
            let joined = pool.join();
            sequencer.seal();

            // A worker failure aborts the queue, which in turn makes dispatch
            // fail with `QueueClosed`; report the root cause first.
            if let Some(err) = sequencer.take_failure() {
                return Err(err);
            }
            joined?;
            dispatched?;
            sequencer.await_completion(plan.len())
        })?;

        let (sink, stats) = sequencer.finish()?;
        Ok((sink, stats, plan.len()))
    }
}

/// Submits every chunk of `plan` in index order, blocking on backpressure.
fn dispatch(queue: &TaskQueue, plan: &ChunkPlan) -> Result<(), RleError> {
    for chunk in plan.iter() {
        log::trace!(
            "dispatching chunk {} [{}..{})",
            chunk.index,
            chunk.offset,
            chunk.offset + chunk.length
        );
        queue.submit(chunk)?;
    }
    Ok(())
}

fn load<P: AsRef<Path>>(paths: &[P]) -> Result<InputBuffer, RleError> {
    transition(PipelineState::Loading);
    InputBuffer::load(paths).inspect_err(|err| {
        transition(PipelineState::Failed);
        log::debug!("input loading failed: {}", err);
    })
}

fn transition(state: PipelineState) {
    log::debug!("pipeline state -> {}", state);
}
