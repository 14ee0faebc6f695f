//! Asynchronous worker pool for chunk execution.
//!
//! This module defines the [`WorkerPool`] struct, which manages a fixed set of
//! asynchronous workers responsible for executing [`Chunk`]s. All workers pull
//! from one bounded queue, so a chunk never waits behind a slow request while
//! another worker is idle. Shutdown is coordinated via a shared
//! [`CancellationToken`].
//!
//! The queue holds `worker_count + 1` requests, which is the most the
//! dispatcher's window can have outstanding at once.

use super::{
    request::{TaskOutput, WorkRequest},
    worker::worker_loop,
};
use crate::{
    Error, Result,
    chunk::Chunk,
    executor::ChunkExecutor,
    types::BulkOptions,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A cooperative pool of asynchronous workers that execute chunks.
///
/// Requests go onto a single bounded MPSC queue that every worker receives
/// from. The pool supports graceful, cancellable shutdown.
pub struct WorkerPool {
    queue: mpsc::Sender<WorkRequest>,
    worker_count: usize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Constructs a new [`WorkerPool`] from the sending half of an initialized
    /// work queue served by `worker_count` workers.
    pub const fn new(
        queue: mpsc::Sender<WorkRequest>,
        worker_count: usize,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            worker_count,
            shutdown_token,
            shutdown_timeout,
        }
    }

    /// Spawns `worker_count` workers on the current Tokio runtime, all
    /// sharing `executor` and one work queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `worker_count` is zero.
    pub fn spawn<E>(
        worker_count: usize,
        executor: Arc<E>,
        options: BulkOptions,
        shutdown_timeout: Duration,
    ) -> Result<Self>
    where
        E: ChunkExecutor + ?Sized + 'static,
    {
        if worker_count == 0 {
            return Err(Error::InvalidConfig {
                reason: "worker count must be greater than 0".into(),
            });
        }

        let (tx, rx) = mpsc::channel(worker_count + 1);
        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..worker_count {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&executor),
                options,
            ));
        }

        Ok(Self::new(
            tx,
            worker_count,
            CancellationToken::new(),
            shutdown_timeout,
        ))
    }

    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queues `chunk` for the next free worker and returns the receiver on
    /// which its records will arrive.
    ///
    /// Waits for queue space when every slot is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down (`shutdown_token` was cancelled).
    /// - The work queue is closed.
    pub async fn submit(&self, chunk: Chunk) -> Result<oneshot::Receiver<TaskOutput>> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let sequence = chunk.sequence();
        let (response, rx) = oneshot::channel();

        match self.queue.send(WorkRequest::Execute { chunk, response }).await {
            Ok(()) => Ok(rx),
            Err(_) => Err(Error::ChannelError {
                context: format!("work queue closed before chunk {sequence}"),
            }),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`] to prevent new work.
    /// - Queues one [`WorkRequest::Shutdown`] per worker behind any chunks
    ///   still waiting. Each worker consumes exactly one and stops.
    /// - Waits (up to `shutdown_timeout` per request) for acknowledgements.
    pub async fn shutdown(&self) {
        tracing::debug!("Refusing new chunks");
        self.shutdown_token.cancel();

        let mut shutdown_handles = Vec::with_capacity(self.worker_count);
        for i in 0..self.worker_count {
            let (tx, rx) = oneshot::channel();
            match timeout(
                self.shutdown_timeout,
                self.queue.send(WorkRequest::Shutdown { response: tx }),
            )
            .await
            {
                Ok(Ok(())) => shutdown_handles.push((i, rx)),
                Ok(Err(e)) => tracing::error!("Failed to queue shutdown request {i}: {e}"),
                Err(_) => tracing::warn!("Work queue is full, shutdown request {i} timed out"),
            }
        }

        let wait = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(wait, rx).await {
                Ok(Ok(())) => tracing::trace!("Shutdown request {i} acknowledged"),
                Ok(Err(e)) => tracing::error!("Shutdown request {i} dropped: {e}"),
                Err(_) => tracing::warn!("Shutdown request {i} timed out"),
            }
        });

        futures::future::join_all(timeout_futures).await;

        tracing::debug!("Worker pool shutdown complete");
    }
}
