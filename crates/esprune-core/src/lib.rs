#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod action;
pub mod aggregate;
pub mod chunk;
pub mod dispatch;
pub mod executor;
pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use action::delete_actions;
pub use aggregate::{ResultAggregator, RunStatus, RunSummary};
pub use chunk::{BulkSerializer, Chunk, ChunkLimits, JsonLines, chunk_actions};
pub use dispatch::{DispatchState, Dispatcher};
pub use executor::{ChunkExecutor, execute_with_options};
pub use pool::WorkerPool;
// Public re-export so implementors of `ChunkExecutor` use the same macro
// version as this crate.
pub use async_trait::async_trait;
