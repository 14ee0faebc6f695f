//! Bounded, submission-ordered chunk dispatch.
//!
//! The [`Dispatcher`] sits between the chunk stream and the [`WorkerPool`].
//! It keeps a sliding [`Window`] of at most `worker_count + 1` in-flight
//! tasks and hands results back one chunk at a time, always the oldest
//! submitted chunk first:
//!
//! 1. While the window has room and input remains, pull a chunk and submit
//!    it. Submission never waits on earlier tasks.
//! 2. Once the window is full (or the input is exhausted), wait for the head
//!    task, remove it and return its records.
//! 3. The next call refills the freed slot before waiting on the new head.
//!
//! Chunks are only pulled when a slot is free, so a fast producer can never
//! get more than `capacity` chunks ahead of the consumer. The cost of the
//! ordering guarantee is head-of-line blocking: a chunk that finished early
//! waits behind a slower, earlier one and its worker slot stays occupied in
//! the window until then.
//!
//! ## Failure
//!
//! A task-level error (or an error from the chunk stream) stops all further
//! submissions. The remaining in-flight tasks are awaited and their records
//! discarded so that no bulk call outlives the dispatcher, then the error is
//! returned. Every later call returns `None`.
//!
//! ## Cancellation
//!
//! Once the [`CancellationToken`] fires, no new chunk is pulled and a
//! submission still waiting for queue space is dropped; tasks already in the
//! window are drained and their records returned normally.
//! [`Dispatcher::was_cancelled`] reports whether the input was cut short.

pub mod window;

#[cfg(test)]
mod tests;

pub use window::{Task, Window};

use crate::{Error, Result, chunk::Chunk, pool::WorkerPool, types::ResultRecord};
use core::pin::Pin;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Observable phase of a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// The window has free slots and input remains.
    Filling,
    /// The window is at capacity; the next step waits on the head task.
    Full,
    /// Input is exhausted (or cut short); only head waits remain.
    Draining,
    /// Window empty and input exhausted.
    Done,
}

/// Drives chunks through a [`WorkerPool`] with bounded buffering.
pub struct Dispatcher<St> {
    chunks: Pin<Box<St>>,
    pool: Arc<WorkerPool>,
    window: Window,
    cancel: CancellationToken,
    input_done: bool,
    cancelled: bool,
    submitted: u64,
    peak: usize,
}

impl<St> Dispatcher<St>
where
    St: Stream<Item = Result<Chunk>>,
{
    /// Creates a dispatcher whose window holds `pool.worker_count() + 1`
    /// tasks.
    pub fn new(chunks: St, pool: Arc<WorkerPool>, cancel: CancellationToken) -> Self {
        let capacity = pool.worker_count() + 1;
        Self {
            chunks: Box::pin(chunks),
            pool,
            window: Window::with_capacity(capacity),
            cancel,
            input_done: false,
            cancelled: false,
            submitted: 0,
            peak: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Largest number of tasks the window has held so far.
    pub const fn peak_window(&self) -> usize {
        self.peak
    }

    /// Number of chunks submitted to the pool so far.
    pub const fn submitted(&self) -> u64 {
        self.submitted
    }

    /// `true` if cancellation stopped the dispatcher before the chunk stream
    /// was exhausted.
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn state(&self) -> DispatchState {
        match (self.input_done, self.window.is_empty(), self.window.is_full()) {
            (true, true, _) => DispatchState::Done,
            (true, false, _) => DispatchState::Draining,
            (false, _, true) => DispatchState::Full,
            (false, _, false) => DispatchState::Filling,
        }
    }

    /// Returns the records of the next chunk in submission order, or `None`
    /// once every chunk has been delivered.
    ///
    /// # Errors
    ///
    /// Returns the first task-level or chunk stream error, after the window
    /// has been drained.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<ResultRecord>>> {
        if let Err(e) = self.fill().await {
            return Some(Err(self.abort(e).await));
        }

        let task = self.window.pop_head()?;
        match task.wait().await {
            Ok(records) => Some(Ok(records)),
            Err(e) => Some(Err(self.abort(e).await)),
        }
    }

    /// Flattens the dispatcher into a stream of per-item records.
    pub fn into_stream(self) -> impl Stream<Item = Result<ResultRecord>> {
        stream::unfold(self, |mut dispatcher| async move {
            let batch = dispatcher.next_batch().await?;
            Some((batch, dispatcher))
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
        .try_flatten()
    }

    async fn fill(&mut self) -> Result<()> {
        while !self.input_done && !self.window.is_full() {
            let pulled = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                next = self.chunks.next() => Some(next),
            };
            let Some(next) = pulled else {
                self.stop_on_cancel();
                break;
            };

            match next {
                Some(Ok(chunk)) => {
                    // A chunk whose submission loses to cancellation is never
                    // queued, so no worker will run it.
                    let queued = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => None,
                        task = Task::submit(&self.pool, chunk) => Some(task),
                    };
                    let Some(task) = queued else {
                        self.stop_on_cancel();
                        break;
                    };
                    self.window.push(task?);
                    self.submitted += 1;
                    self.peak = self.peak.max(self.window.len());
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.input_done = true;
                    tracing::debug!(
                        chunks = self.submitted,
                        in_flight = self.window.len(),
                        "Chunk stream exhausted, draining"
                    );
                }
            }
        }
        Ok(())
    }

    fn stop_on_cancel(&mut self) {
        self.input_done = true;
        self.cancelled = true;
        tracing::warn!(
            chunks = self.submitted,
            in_flight = self.window.len(),
            "Cancellation requested, no further chunks will be submitted"
        );
    }

    async fn abort(&mut self, error: Error) -> Error {
        self.input_done = true;

        let mut tasks = 0;
        let mut records = 0;
        while let Some(task) = self.window.pop_head() {
            tasks += 1;
            if let Ok(batch) = task.wait().await {
                records += batch.len();
            }
        }

        tracing::error!(
            error = %error,
            discarded_chunks = tasks,
            discarded_records = records,
            "Dispatch aborted"
        );
        error
    }
}
