use super::{BulkSerializer, Chunk, ChunkBuilder, ChunkLimits};
use crate::{Result, types::DeleteAction};
use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::Stream;
use pin_project_lite::pin_project;

/// Wraps a stream of actions into a lazy stream of [`Chunk`]s.
///
/// Nothing is pulled from `actions` until the returned stream is polled, and
/// at most one open chunk is buffered at a time.
pub fn chunk_actions<St, S>(actions: St, limits: ChunkLimits, serializer: S) -> Chunks<St, S>
where
    St: Stream<Item = Result<DeleteAction>>,
    S: BulkSerializer,
{
    Chunks {
        actions,
        builder: ChunkBuilder::new(limits, serializer),
        done: false,
    }
}

pin_project! {
    /// Stream returned by [`chunk_actions`].
    ///
    /// Yields sealed chunks in order. The first error (from upstream or from
    /// the serializer) is forwarded and terminates the stream; the partially
    /// filled chunk is discarded in that case.
    #[must_use = "streams do nothing unless polled"]
    pub struct Chunks<St, S> {
        #[pin]
        actions: St,
        builder: ChunkBuilder<S>,
        done: bool,
    }
}

impl<St, S> Stream for Chunks<St, S>
where
    St: Stream<Item = Result<DeleteAction>>,
    S: BulkSerializer,
{
    type Item = Result<Chunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.actions.as_mut().poll_next(cx)) {
                Some(Ok(action)) => match this.builder.push(action) {
                    Ok(Some(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                    Ok(None) => {}
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Some(Err(e)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    *this.done = true;
                    return Poll::Ready(this.builder.finish().map(Ok));
                }
            }
        }
    }
}
