//! Grouping of delete actions into size-bounded bulk chunks.
//!
//! A [`Chunk`] is the unit of work handed to the worker pool: an ordered,
//! sealed batch of [`DeleteAction`]s together with its newline-delimited bulk
//! body. Two bounds apply to every chunk:
//!
//! - at most [`ChunkLimits::max_count`] actions
//! - at most [`ChunkLimits::max_bytes`] serialized bytes, unless the chunk
//!   holds a single action that alone exceeds the bound
//!
//! ## Structure
//!
//! - [`builder`] - synchronous accumulator ([`ChunkBuilder`])
//! - [`stream`] - lazy [`Stream`](futures::Stream) adapter ([`Chunks`])

pub mod builder;
pub mod stream;


pub use builder::ChunkBuilder;
pub use stream::{Chunks, chunk_actions};

use crate::{
    Error, Result,
    types::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_BYTES, DeleteAction},
};
use bytes::Bytes;
use serde::Serialize;

/// Item-count and byte-size bounds for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    max_count: usize,
    max_bytes: usize,
}

impl ChunkLimits {
    /// Creates chunk bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either bound is zero.
    pub fn new(max_count: usize, max_bytes: usize) -> Result<Self> {
        if max_count == 0 {
            return Err(Error::InvalidConfig {
                reason: "chunk item-count bound must be greater than 0".into(),
            });
        }
        if max_bytes == 0 {
            return Err(Error::InvalidConfig {
                reason: "chunk byte bound must be greater than 0".into(),
            });
        }
        Ok(Self {
            max_count,
            max_bytes,
        })
    }

    pub const fn max_count(&self) -> usize {
        self.max_count
    }

    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_CHUNK_SIZE,
            max_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

/// A sealed batch of delete actions and its encoded bulk body.
#[derive(Debug, Clone)]
pub struct Chunk {
    sequence: u64,
    actions: Vec<DeleteAction>,
    body: Bytes,
}

impl Chunk {
    pub(crate) const fn new(sequence: u64, actions: Vec<DeleteAction>, body: Bytes) -> Self {
        Self {
            sequence,
            actions,
            body,
        }
    }

    /// Position of this chunk in emission (and submission) order.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn actions(&self) -> &[DeleteAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The newline-delimited bulk request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialized size of the chunk in bytes.
    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }
}

/// Encodes a delete action into its bulk action line.
///
/// The returned bytes must not contain the trailing newline; the chunker adds
/// it and accounts for it in the chunk size.
pub trait BulkSerializer {
    /// # Errors
    ///
    /// Returns [`Error::Serialize`] if the action cannot be encoded.
    fn encode(&self, action: &DeleteAction) -> Result<Vec<u8>>;
}

/// JSON action lines, as expected by the bulk API.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

#[derive(Serialize)]
struct DeleteLine<'a> {
    delete: &'a DeleteAction,
}

impl BulkSerializer for JsonLines {
    fn encode(&self, action: &DeleteAction) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&DeleteLine { delete: action })?)
    }
}
