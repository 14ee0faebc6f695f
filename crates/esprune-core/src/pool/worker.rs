use super::request::WorkRequest;
use crate::{
    executor::{ChunkExecutor, execute_with_options},
    types::BulkOptions,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Receiving half of the pool's work queue, shared by every worker.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<WorkRequest>>>;

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker executes one chunk at a time. Workers take turns receiving
/// from the pool's single queue, so whichever worker is free takes the next
/// request. The queue lock is held only while waiting for a request, never
/// while a chunk runs. The loop ends on a shutdown signal or when the queue
/// closes.
///
/// # Arguments
///
/// - `worker_id`: Numeric identifier for this worker (used for logs).
/// - `queue`: Shared receiver through which [`WorkRequest`]s arrive.
/// - `executor`: Backend shared by every worker of the pool.
/// - `options`: Failure policy applied to every chunk.
///
/// # Request Types
///
/// - [`WorkRequest::Execute`] - Runs the chunk and answers on its one-shot
///   channel. A chunk whose receiver is already gone is skipped without
///   contacting the backend.
/// - [`WorkRequest::Shutdown`] - Signals the worker to stop and acknowledge
///   shutdown.
pub async fn worker_loop<E>(
    worker_id: usize,
    queue: SharedQueue,
    executor: Arc<E>,
    options: BulkOptions,
) where
    E: ChunkExecutor + ?Sized + 'static,
{
    tracing::trace!("Worker {worker_id} started");

    loop {
        let next = queue.lock().await.recv().await;
        let Some(work) = next else {
            break;
        };

        match work {
            WorkRequest::Execute { chunk, response } => {
                if response.is_closed() {
                    tracing::debug!(
                        chunk = chunk.sequence(),
                        "Worker {worker_id} skipping abandoned chunk"
                    );
                    continue;
                }

                let output = execute_with_options(executor.as_ref(), &chunk, options).await;
                // The chunk is released here, before the dispatcher collects
                // the records.
                drop(chunk);

                if response.send(output).is_err() {
                    tracing::debug!("Worker {worker_id} result receiver dropped");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
