//! One retention run, from the initial counts to the final summary.
//!
//! [`RetentionJob::run`] counts the index, then (unless there is nothing to
//! do or this is a dry run) wires the scan into the bounded bulk pipeline:
//!
//! ```text
//! scroll hits -> delete_actions -> chunk_actions -> Dispatcher -> ResultAggregator
//!                                                      |
//!                                                 WorkerPool -> BulkClient
//! ```

use crate::cleaner::{
    config::CleanerConfig,
    search::{BulkClient, SearchClient, query},
    telemetry::{increment_documents_deleted, increment_documents_failed},
};
use anyhow::Context;
use esprune_core::{
    Dispatcher, JsonLines, ResultAggregator, RunStatus, RunSummary, WorkerPool, chunk_actions,
    delete_actions,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No document matched the retention filter.
    NothingToDelete { total: u64 },
    /// Counts only; nothing was deleted.
    DryRun { total: u64, matches: u64 },
    /// The pipeline ran, to completion or until cancelled.
    Finished(RunSummary),
}

pub struct RetentionJob {
    config: CleanerConfig,
    client: SearchClient,
}

impl RetentionJob {
    pub fn new(config: CleanerConfig) -> anyhow::Result<Self> {
        let client = SearchClient::new(config.nodes.clone(), config.request_timeout)?;
        Ok(Self { config, client })
    }

    pub const fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Fails if the cluster cannot be counted or the pipeline aborts on a
    /// task-level error. Per-document failures are counted, never raised,
    /// unless item errors are not suppressed.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        let index = &self.config.index;
        let years = self.config.years;

        tracing::info!(
            "connecting to cluster {} index {}",
            self.cluster_label(),
            index
        );

        let total = self
            .client
            .count(index, &query::match_all())
            .await
            .with_context(|| format!("cannot count documents of index {index}"))?;

        let filter = query::older_than(&self.config.field, years);
        let matches = self
            .client
            .count(index, &filter)
            .await
            .with_context(|| format!("cannot count expired documents of index {index}"))?;

        if matches < 1 {
            tracing::warn!("no documents older than {years} year(s) found ({total} total)");
            return Ok(Outcome::NothingToDelete { total });
        }

        if self.config.dry_run {
            tracing::info!(
                "dry run: {matches} of {total} documents older than {years} year(s) would be deleted"
            );
            return Ok(Outcome::DryRun { total, matches });
        }

        tracing::info!("{matches} of {total} documents older than {years} year(s), deleting...");
        let summary = self.delete(filter, matches, cancel).await?;
        Ok(Outcome::Finished(summary))
    }

    async fn delete(
        &self,
        filter: Value,
        matches: u64,
        cancel: CancellationToken,
    ) -> anyhow::Result<RunSummary> {
        let config = &self.config;
        let executor = Arc::new(BulkClient::new(self.client.clone()));
        let pool = Arc::new(WorkerPool::spawn(
            config.workers,
            executor,
            config.bulk,
            config.shutdown_timeout,
        )?);

        let hits = self.client.scan(
            &config.index,
            &filter,
            config.scroll_size,
            &config.scroll_keepalive,
        );
        let chunks = chunk_actions(delete_actions(hits), config.limits, JsonLines);
        let mut dispatcher = Dispatcher::new(chunks, Arc::clone(&pool), cancel);
        let mut aggregator =
            ResultAggregator::new(config.index.clone()).with_progress_every(config.progress_every);

        let status = aggregator.consume(&mut dispatcher).await;
        pool.shutdown().await;

        increment_documents_deleted(aggregator.deleted());
        increment_documents_failed(aggregator.failed());

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(
                    deleted = aggregator.deleted(),
                    failed = aggregator.failed(),
                    index = %config.index,
                    "Run aborted: {e}"
                );
                return Err(e).context("bulk deletion aborted");
            }
        };

        let summary = aggregator.finish(status);
        if count_drifted(&summary, matches) {
            tracing::warn!(
                expected = matches,
                processed = summary.processed(),
                "processed {} documents but {} matched; the index changed during the run",
                summary.processed(),
                matches
            );
        }
        Ok(summary)
    }

    fn cluster_label(&self) -> String {
        self.client
            .nodes()
            .iter()
            .map(|url| url.as_str().trim_end_matches('/'))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Whether a completed run processed a different number of documents than
/// the count taken before it started.
fn count_drifted(summary: &RunSummary, matches: u64) -> bool {
    summary.status == RunStatus::Completed && summary.processed() != matches
}
