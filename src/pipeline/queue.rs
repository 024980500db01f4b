// In: src/pipeline/queue.rs

//! A bounded, blocking FIFO of pending chunks shared by the driver (producer)
//! and the worker pool (consumers), built on a `crossbeam_channel::bounded`
//! channel.
//!
//! `submit` blocks while the channel is full, which is what caps memory when
//! the workers fall behind. `take` blocks while it is empty and open. Two ways
//! of closing it exist:
//!
//! * `shutdown` is the normal end of dispatch: the sender is dropped, queued
//!   chunks are still handed out, and workers see `Task::Shutdown` only once
//!   the channel is drained.
//! * `abort` is the failure path: queued chunks are dropped, every blocked
//!   caller wakes up, and a driver stuck in `submit` gets `QueueClosed`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::error::RleError;
use crate::pipeline::chunk::Chunk;

/// What a worker receives from `take`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Chunk(Chunk),
    Shutdown,
}

#[derive(Debug)]
pub struct TaskQueue {
    capacity: usize,
    /// `None` once dispatch has ended.
    sender: Mutex<Option<Sender<Chunk>>>,
    receiver: Receiver<Chunk>,
    /// Dropping this sender is the abort broadcast: `abort_rx` turns ready for
    /// every blocked `select!`.
    abort_tx: Mutex<Option<Sender<()>>>,
    abort_rx: Receiver<()>,
    aborted: AtomicBool,
}

impl TaskQueue {
    /// Creates a queue holding at most `capacity` chunks (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let (abort_tx, abort_rx) = bounded(0);
        Self {
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver,
            abort_tx: Mutex::new(Some(abort_tx)),
            abort_rx,
            aborted: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues `chunk`, blocking while the queue is full.
    ///
    /// Fails with `QueueClosed` once the queue has been shut down or aborted.
    pub fn submit(&self, chunk: Chunk) -> Result<(), RleError> {
        if self.is_aborted() {
            return Err(RleError::QueueClosed);
        }
        // Clone out of the lock so a blocked send never holds it.
        let sender = lock(&self.sender).clone().ok_or(RleError::QueueClosed)?;

        select! {
            send(sender, chunk) -> sent => sent.map_err(|_| RleError::QueueClosed)?,
            recv(self.abort_rx) -> _ => return Err(RleError::QueueClosed),
        }

        if self.is_aborted() {
            // Lost the race with `abort`; keep the queue empty.
            self.discard_pending();
            return Err(RleError::QueueClosed);
        }
        Ok(())
    }

    /// Dequeues the oldest chunk, blocking while the queue is empty and open.
    pub fn take(&self) -> Task {
        if self.is_aborted() {
            return Task::Shutdown;
        }
        select! {
            recv(self.receiver) -> msg => match msg {
                Ok(chunk) if !self.is_aborted() => Task::Chunk(chunk),
                // Disconnected and drained, or aborted meanwhile.
                _ => Task::Shutdown,
            },
            recv(self.abort_rx) -> _ => Task::Shutdown,
        }
    }

    /// Marks the end of dispatch. Idempotent.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
    }

    /// Drops every queued chunk and closes the queue. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        lock(&self.abort_tx).take();
        lock(&self.sender).take();
        self.discard_pending();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Number of chunks currently waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn discard_pending(&self) {
        let dropped = self.receiver.try_iter().count();
        if dropped > 0 {
            log::debug!("task queue aborted; discarded {} pending chunks", dropped);
        }
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
