use crate::{Result, chunk::Chunk, types::ResultRecord};
use tokio::sync::oneshot;

/// What a task eventually resolves to: one record per action of its chunk.
pub type TaskOutput = Result<Vec<ResultRecord>>;

/// A message sent from the worker pool to an individual worker task.
///
/// [`WorkRequest`]s are sent over bounded asynchronous channels and are
/// consumed by the worker's main event loop.
#[derive(Debug)]
pub enum WorkRequest {
    /// Execute `chunk` against the bulk backend.
    ///
    /// - `chunk`: The sealed chunk; the worker owns it until execution ends.
    /// - `response`: One-shot channel through which the ordered records (or
    ///   the task-level error) are delivered to the dispatcher.
    Execute {
        chunk: Chunk,
        response: oneshot::Sender<TaskOutput>,
    },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: One-shot channel for acknowledging that the worker has
    ///   completed its shutdown routine.
    Shutdown { response: oneshot::Sender<()> },
}
