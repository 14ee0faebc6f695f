//! The seam between the pipeline and the bulk backend.
//!
//! A [`ChunkExecutor`] sends one [`Chunk`] and reports one [`ResultRecord`] per
//! action. It must not fail because individual documents could not be
//! deleted; those are `success == false` records. It fails only when the
//! call as a whole did (transport error, unusable response).
//!
//! [`execute_with_options`] wraps an executor call with the [`BulkOptions`]
//! policy and checks that the backend answered for every action.

use crate::{
    Error, Result,
    chunk::Chunk,
    types::{BulkOptions, ItemInfo, ResultRecord},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Executes a single chunk against the bulk backend.
#[async_trait]
pub trait ChunkExecutor: Send + Sync {
    /// # Errors
    ///
    /// Returns a task-level error when the bulk call itself fails.
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>>;
}

#[async_trait]
impl<E: ChunkExecutor + ?Sized> ChunkExecutor for Arc<E> {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        (**self).execute(chunk).await
    }
}

/// Runs `executor` on `chunk` and applies `options`.
///
/// # Errors
///
/// - the executor error, unless `suppress_task_errors` is set
/// - [`Error::MalformedResponse`] if the record count differs from the
///   action count
/// - [`Error::BulkItems`] if any item failed and `suppress_item_errors` is
///   unset
pub async fn execute_with_options<E>(
    executor: &E,
    chunk: &Chunk,
    options: BulkOptions,
) -> Result<Vec<ResultRecord>>
where
    E: ChunkExecutor + ?Sized,
{
    let records = match executor.execute(chunk).await {
        Ok(records) => records,
        Err(e) if options.suppress_task_errors && e.is_task_error() => {
            tracing::debug!(
                chunk = chunk.sequence(),
                error = %e,
                "Chunk execution failed, reporting every action as failed"
            );
            return Ok(failed_records(chunk, &e));
        }
        Err(e) => return Err(e),
    };

    if records.len() != chunk.len() {
        return Err(Error::MalformedResponse {
            context: format!(
                "chunk {} sent {} actions but received {} results",
                chunk.sequence(),
                chunk.len(),
                records.len()
            ),
        });
    }

    if !options.suppress_item_errors {
        let mut failures = records.iter().filter(|r| !r.success);
        if let Some(first) = failures.next() {
            return Err(Error::BulkItems {
                failed: 1 + failures.count(),
                first: first.info.to_string(),
            });
        }
    }

    Ok(records)
}

fn failed_records(chunk: &Chunk, error: &Error) -> Vec<ResultRecord> {
    let reason = serde_json::json!({
        "type": "task_error",
        "reason": error.to_string(),
    });
    chunk
        .actions()
        .iter()
        .map(|action| ResultRecord::failed(ItemInfo::rejected(action, 500, reason.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingExecutor, FlakyIdExecutor, RecordingExecutor, chunk_of};

    #[tokio::test]
    async fn passes_records_through_by_default() {
        let chunk = chunk_of(0, &["1", "2", "3"]);
        let records = execute_with_options(&RecordingExecutor::default(), &chunk, BulkOptions::default())
            .await
            .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.info.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert!(records.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn item_failures_are_data_when_suppressed() {
        let chunk = chunk_of(0, &["10", "11", "20"]);
        let records = execute_with_options(&FlakyIdExecutor, &chunk, BulkOptions::default())
            .await
            .unwrap();

        let success: Vec<_> = records.iter().map(|r| r.success).collect();
        assert_eq!(success, [false, true, false]);
    }

    #[tokio::test]
    async fn item_failures_raise_when_not_suppressed() {
        let chunk = chunk_of(0, &["10", "11", "20"]);
        let options = BulkOptions {
            suppress_item_errors: false,
            suppress_task_errors: false,
        };
        let err = execute_with_options(&FlakyIdExecutor, &chunk, options)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BulkItems { failed: 2, .. }));
    }

    #[tokio::test]
    async fn task_errors_propagate_by_default() {
        let chunk = chunk_of(3, &["1", "2"]);
        let err = execute_with_options(&FailingExecutor, &chunk, BulkOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn task_errors_become_item_failures_when_suppressed() {
        let chunk = chunk_of(3, &["1", "2"]);
        let options = BulkOptions {
            suppress_item_errors: true,
            suppress_task_errors: true,
        };
        let records = execute_with_options(&FailingExecutor, &chunk, options)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.success));
        assert_eq!(records[1].info.id, "2");
        assert!(records[0].info.error.is_some());
    }

    struct ShortExecutor;

    #[async_trait]
    impl ChunkExecutor for ShortExecutor {
        async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
            let first = &chunk.actions()[0];
            Ok(vec![ResultRecord::ok(ItemInfo::acknowledged(first, 200, "deleted"))])
        }
    }

    #[tokio::test]
    async fn missing_results_are_a_malformed_response() {
        let chunk = chunk_of(0, &["1", "2"]);
        let err = execute_with_options(&ShortExecutor, &chunk, BulkOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedResponse { .. }));
    }
}
