//! Mock executors shared by the unit tests.

use crate::{
    Error, Result,
    chunk::Chunk,
    executor::ChunkExecutor,
    types::{DeleteAction, ItemInfo, ResultRecord},
};
use async_trait::async_trait;
use bytes::Bytes;
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub fn chunk_of(sequence: u64, ids: &[&str]) -> Chunk {
    let actions = ids
        .iter()
        .map(|id| DeleteAction::new("logs", None, *id, None))
        .collect();
    Chunk::new(sequence, actions, Bytes::new())
}

fn acknowledge(chunk: &Chunk) -> Vec<ResultRecord> {
    chunk
        .actions()
        .iter()
        .map(|a| ResultRecord::ok(ItemInfo::acknowledged(a, 200, "deleted")))
        .collect()
}

/// Succeeds for every action and records how many chunks ran at once.
#[derive(Default, Clone)]
pub struct RecordingExecutor {
    pub running: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub executed: Arc<Mutex<Vec<u64>>>,
    pub delay: Duration,
}

impl RecordingExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChunkExecutor for RecordingExecutor {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.executed.lock().unwrap().push(chunk.sequence());
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(acknowledge(chunk))
    }
}

/// Sleeps for a per-sequence latency so that completion order can be forced.
pub struct LatencyExecutor {
    pub latencies: Vec<Duration>,
    pub started: Arc<Mutex<Vec<(u64, Instant)>>>,
    pub completed: Arc<Mutex<Vec<u64>>>,
}

impl LatencyExecutor {
    /// Latencies in milliseconds, indexed by chunk sequence.
    pub fn new(millis: &[u64]) -> Self {
        Self {
            latencies: millis.iter().copied().map(Duration::from_millis).collect(),
            started: Arc::default(),
            completed: Arc::default(),
        }
    }
}

#[async_trait]
impl ChunkExecutor for LatencyExecutor {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        let latency = self
            .latencies
            .get(chunk.sequence() as usize)
            .copied()
            .unwrap_or_default();
        self.started
            .lock()
            .unwrap()
            .push((chunk.sequence(), Instant::now()));
        tokio::time::sleep(latency).await;
        self.completed.lock().unwrap().push(chunk.sequence());
        Ok(acknowledge(chunk))
    }
}

/// Reports a 404 for every action whose id ends in `0`.
pub struct FlakyIdExecutor;

#[async_trait]
impl ChunkExecutor for FlakyIdExecutor {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        Ok(chunk
            .actions()
            .iter()
            .map(|a| {
                if a.id().ends_with('0') {
                    ResultRecord::failed(ItemInfo::rejected(
                        a,
                        404,
                        serde_json::json!({"result": "not_found"}),
                    ))
                } else {
                    ResultRecord::ok(ItemInfo::acknowledged(a, 200, "deleted"))
                }
            })
            .collect())
    }
}

/// Fails every call at the transport level.
pub struct FailingExecutor;

#[async_trait]
impl ChunkExecutor for FailingExecutor {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        Err(Error::Transport {
            context: format!("connection reset while sending chunk {}", chunk.sequence()),
        })
    }
}

/// Fails only the chunk with the given sequence, after `delay`; the others
/// succeed after `delay` as well.
pub struct FailAtExecutor {
    pub sequence: u64,
    pub delay: Duration,
    pub completed: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkExecutor for FailAtExecutor {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        if chunk.sequence() == self.sequence {
            return Err(Error::Transport {
                context: "bulk request timed out".into(),
            });
        }
        Ok(acknowledge(chunk))
    }
}
