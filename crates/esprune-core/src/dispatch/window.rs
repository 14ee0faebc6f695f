use crate::{
    Error, Result,
    chunk::Chunk,
    pool::{TaskOutput, WorkerPool},
};
use std::collections::VecDeque;
use tokio::{sync::oneshot, time::Instant};

/// A submitted chunk whose records have not been collected yet.
#[derive(Debug)]
pub struct Task {
    sequence: u64,
    actions: usize,
    submitted_at: Instant,
    rx: oneshot::Receiver<TaskOutput>,
}

impl Task {
    /// Hands `chunk` to the pool and keeps the handle to its result.
    pub async fn submit(pool: &WorkerPool, chunk: Chunk) -> Result<Self> {
        let sequence = chunk.sequence();
        let actions = chunk.len();
        let rx = pool.submit(chunk).await?;
        Ok(Self {
            sequence,
            actions,
            submitted_at: Instant::now(),
            rx,
        })
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn actions(&self) -> usize {
        self.actions
    }

    /// Waits for the worker to finish this task.
    ///
    /// # Errors
    ///
    /// Returns the task-level error from the worker, or
    /// [`Error::ChannelError`] if the worker went away without answering.
    pub async fn wait(self) -> TaskOutput {
        let output = self.rx.await.map_err(|_| Error::ChannelError {
            context: format!("worker dropped chunk {}", self.sequence),
        })?;
        tracing::trace!(
            chunk = self.sequence,
            actions = self.actions,
            elapsed_ms = self.submitted_at.elapsed().as_millis() as u64,
            "Chunk collected"
        );
        output
    }
}

/// Ordered, bounded queue of in-flight tasks.
///
/// Tasks enter at the tail on submission and leave from the head only, which
/// is what makes result delivery follow submission order.
#[derive(Debug)]
pub struct Window {
    tasks: VecDeque<Task>,
    capacity: usize,
}

impl Window {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.capacity
    }

    pub fn push(&mut self, task: Task) {
        debug_assert!(!self.is_full(), "window overflow");
        self.tasks.push_back(task);
    }

    pub fn pop_head(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }
}
