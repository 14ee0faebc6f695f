//! Conversion of scan hits into bulk delete actions.

use crate::{
    Error, Result,
    types::{DeleteAction, DocumentHandle},
};
use futures::{Stream, StreamExt};

impl TryFrom<DocumentHandle> for DeleteAction {
    type Error = Error;

    fn try_from(handle: DocumentHandle) -> Result<Self> {
        let DocumentHandle {
            index,
            doc_type,
            id,
            routing,
        } = handle;

        let id = match id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(Error::MalformedHandle {
                    reason: format!("hit in index `{index}` has no `_id`"),
                });
            }
        };

        if index.is_empty() {
            return Err(Error::MalformedHandle {
                reason: format!("hit `{id}` has no `_index`"),
            });
        }

        Ok(Self::new(index, doc_type, id, routing))
    }
}

/// Lazily maps each scanned handle to its [`DeleteAction`], preserving order.
///
/// Upstream errors pass through untouched. A malformed handle surfaces as
/// [`Error::MalformedHandle`]; callers treat it as fatal for the run.
pub fn delete_actions<St>(handles: St) -> impl Stream<Item = Result<DeleteAction>>
where
    St: Stream<Item = Result<DocumentHandle>>,
{
    handles.map(|handle| handle.and_then(DeleteAction::try_from))
}
