//! Tallying of per-item outcomes.

use crate::{
    Result,
    chunk::Chunk,
    dispatch::Dispatcher,
    types::{DEFAULT_PROGRESS_EVERY, ResultRecord},
};
use core::fmt;
use futures::Stream;
use serde::Serialize;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every chunk from the scan was dispatched and collected.
    Completed,
    /// Cancellation cut the scan short; counts are partial.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final tally of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub deleted: u64,
    pub failed: u64,
    pub index: String,
    pub status: RunStatus,
}

impl RunSummary {
    pub const fn processed(&self) -> u64 {
        self.deleted + self.failed
    }
}

/// Sequential consumer of the ordered record stream.
///
/// Owned by the single control flow draining the dispatcher, so counters are
/// plain integers.
#[derive(Debug)]
pub struct ResultAggregator {
    index: String,
    deleted: u64,
    failed: u64,
    progress_every: u64,
    progress_reports: u64,
}

impl ResultAggregator {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            deleted: 0,
            failed: 0,
            progress_every: DEFAULT_PROGRESS_EVERY,
            progress_reports: 0,
        }
    }

    /// Sets the number of successful deletions between progress logs. Zero
    /// disables progress logging.
    #[must_use]
    pub const fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    pub const fn deleted(&self) -> u64 {
        self.deleted
    }

    pub const fn failed(&self) -> u64 {
        self.failed
    }

    /// Number of progress lines logged so far.
    pub const fn progress_reports(&self) -> u64 {
        self.progress_reports
    }

    /// Whether the current deletion count lands on a progress boundary.
    const fn progress_due(&self) -> bool {
        self.progress_every > 0 && self.deleted > 0 && self.deleted % self.progress_every == 0
    }

    pub fn record(&mut self, record: ResultRecord) {
        if !record.success {
            self.failed += 1;
            tracing::warn!(info = %record.info, "failed: document could not be deleted");
            return;
        }

        self.deleted += 1;
        if self.progress_due() {
            self.progress_reports += 1;
            tracing::info!(
                deleted = self.deleted,
                failed = self.failed,
                "deleted documents: {}",
                self.deleted
            );
        }
    }

    pub fn record_batch(&mut self, records: impl IntoIterator<Item = ResultRecord>) {
        for record in records {
            self.record(record);
        }
    }

    /// Drains `dispatcher` into this aggregator.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's first error; counts gathered up to that point
    /// remain available on `self`.
    pub async fn consume<St>(&mut self, dispatcher: &mut Dispatcher<St>) -> Result<RunStatus>
    where
        St: Stream<Item = Result<Chunk>>,
    {
        while let Some(batch) = dispatcher.next_batch().await {
            self.record_batch(batch?);
        }

        Ok(if dispatcher.was_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        })
    }

    /// Emits the final summary and returns it.
    pub fn finish(self, status: RunStatus) -> RunSummary {
        tracing::info!(
            deleted = self.deleted,
            failed = self.failed,
            index = %self.index,
            status = %status,
            "deleted: {} failed: {} documents from index: {}",
            self.deleted,
            self.failed,
            self.index
        );

        RunSummary {
            deleted: self.deleted,
            failed: self.failed,
            index: self.index,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeleteAction, ItemInfo};

    fn record(id: &str, success: bool) -> ResultRecord {
        let action = DeleteAction::new("logs", None, id, None);
        if success {
            ResultRecord::ok(ItemInfo::acknowledged(&action, 200, "deleted"))
        } else {
            ResultRecord::failed(ItemInfo::rejected(
                &action,
                404,
                serde_json::json!({"result": "not_found"}),
            ))
        }
    }

    #[test]
    fn counts_successes_and_failures() {
        let mut aggregator = ResultAggregator::new("logs").with_progress_every(2);
        aggregator.record_batch([
            record("1", true),
            record("2", false),
            record("3", true),
            record("4", true),
        ]);

        let summary = aggregator.finish(RunStatus::Completed);
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed(), 4);
        assert_eq!(summary.index, "logs");
    }

    #[test]
    fn progress_is_logged_every_interval_of_deletions() {
        let mut aggregator = ResultAggregator::new("logs").with_progress_every(2);
        let mut reports = Vec::new();
        for (id, success) in [("1", true), ("2", true), ("3", false), ("4", true), ("5", true)] {
            aggregator.record(record(id, success));
            reports.push((aggregator.deleted(), aggregator.progress_reports()));
        }

        // Failures never advance the interval.
        assert_eq!(reports, [(1, 0), (2, 1), (2, 1), (3, 1), (4, 2)]);
    }

    #[test]
    fn progress_boundaries() {
        let mut aggregator = ResultAggregator::new("logs").with_progress_every(2);
        let due: Vec<_> = (1..=4)
            .map(|n| {
                aggregator.deleted = n;
                aggregator.progress_due()
            })
            .collect();
        assert_eq!(due, [false, true, false, true]);
    }

    #[test]
    fn zero_progress_interval_never_reports() {
        let mut aggregator = ResultAggregator::new("logs").with_progress_every(0);
        aggregator.record_batch((0..100).map(|i| record(&i.to_string(), true)));
        assert_eq!(aggregator.deleted(), 100);
        assert_eq!(aggregator.progress_reports(), 0);
        assert!(!aggregator.progress_due());
    }

    #[test]
    fn summary_serializes_status() {
        let summary = ResultAggregator::new("logs").finish(RunStatus::Cancelled);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["deleted"], 0);
    }
}
