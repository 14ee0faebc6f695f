use super::{BulkSerializer, Chunk, ChunkLimits};
use crate::{Result, types::DeleteAction};
use bytes::{BufMut, BytesMut};

/// Accumulates actions into the open chunk and seals it when a bound is hit.
///
/// Sealing happens in two places:
///
/// - before an append, when the action's encoded line would push the open
///   chunk past [`ChunkLimits::max_bytes`]
/// - after an append, when the open chunk reaches
///   [`ChunkLimits::max_count`]
///
/// An empty chunk is never sealed, so an action larger than the byte bound is
/// emitted alone instead of being dropped or split. Each call to
/// [`push`](Self::push) seals at most one chunk.
#[derive(Debug)]
pub struct ChunkBuilder<S> {
    limits: ChunkLimits,
    serializer: S,
    actions: Vec<DeleteAction>,
    body: BytesMut,
    next_sequence: u64,
}

impl<S: BulkSerializer> ChunkBuilder<S> {
    pub fn new(limits: ChunkLimits, serializer: S) -> Self {
        Self {
            limits,
            serializer,
            actions: Vec::with_capacity(initial_capacity(limits)),
            body: BytesMut::new(),
            next_sequence: 0,
        }
    }

    pub const fn limits(&self) -> ChunkLimits {
        self.limits
    }

    /// Number of actions in the open chunk.
    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    /// Appends `action`, returning a chunk if one was sealed.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures. The open chunk is left unchanged.
    pub fn push(&mut self, action: DeleteAction) -> Result<Option<Chunk>> {
        let line = self.serializer.encode(&action)?;
        let cost = line.len() + 1;

        let mut sealed = None;
        if !self.actions.is_empty() && self.body.len() + cost > self.limits.max_bytes() {
            sealed = Some(self.seal());
        }

        self.body.reserve(cost);
        self.body.put_slice(&line);
        self.body.put_u8(b'\n');
        self.actions.push(action);

        if self.actions.len() >= self.limits.max_count() {
            debug_assert!(sealed.is_none());
            sealed = Some(self.seal());
        }

        Ok(sealed)
    }

    /// Seals the final partial chunk, if any actions are pending.
    pub fn finish(&mut self) -> Option<Chunk> {
        if self.actions.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> Chunk {
        let actions = core::mem::replace(
            &mut self.actions,
            Vec::with_capacity(initial_capacity(self.limits)),
        );
        let body = self.body.split().freeze();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Chunk::new(sequence, actions, body)
    }
}

// Very large count bounds are usually paired with a byte bound that seals
// first; don't preallocate for them.
fn initial_capacity(limits: ChunkLimits) -> usize {
    limits.max_count().min(4096)
}
