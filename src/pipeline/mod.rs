// In: src/pipeline/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Chunk Pipeline
// ====================================================================================
//
//   1. [Driver]     -> splits the input buffer into a `ChunkPlan`
//         |
//         `-> submit(chunk) in index order, blocking while the queue is full
//
//   2. [TaskQueue]  -> bounded FIFO of `Chunk`s
//         |
//         `-> take() by any of N workers
//
//   3. [WorkerPool] -> encodes the chunk's slice with a `ChunkEncoder`
//         |
//         `-> deposit(ChunkResult) in completion order
//
//   4. [Sequencer]  -> holds early results, writes to the sink in index order
//
// The input buffer is shared read-only. The queue is a bounded crossbeam
// channel; the sequencer keeps its reorder map and the sink behind one mutex.
// ====================================================================================

pub mod chunk;
pub mod driver;
pub mod pool;
pub mod queue;
pub mod sequencer;

pub use chunk::{Chunk, ChunkPlan, ChunkResult};
pub use driver::{PipelineDriver, PipelineState, RunSummary};
pub use pool::{ChunkEncoder, RleChunkEncoder, WorkerPool};
pub use queue::{Task, TaskQueue};
pub use sequencer::{Sequencer, SequencerStats};
