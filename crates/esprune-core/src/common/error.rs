//! Error types for the bulk delete pipeline.
//!
//! This module defines the central `Error` enum shared by every stage of the
//! pipeline. Per-item deletion failures are deliberately absent: a document
//! that could not be deleted is reported as a
//! [`ResultRecord`](crate::types::ResultRecord) with `success == false`, never
//! as an `Error`.
//!
//! ## Error Cases
//! - `InvalidConfig`: A pipeline bound (chunk limits, worker count) is out of
//!   range.
//! - `MalformedHandle`: A scan hit could not be turned into a delete action.
//! - `Serialize`: A delete action could not be encoded for the bulk body.
//! - `Transport`: A network call to the cluster failed as a whole.
//! - `MalformedResponse`: The backend answered with something unusable.
//! - `BulkItems`: Item failures occurred while item errors are not
//!   suppressed.
//! - `ChannelError`: An internal communication failure between the
//!   dispatcher and the worker pool.
//! - `ServiceShutdown`: Work was submitted after the pool shut down.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the bulk delete pipeline.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// A pipeline parameter is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A document handle from the scan is missing data required to delete it.
    #[error("Malformed document handle: {reason}")]
    MalformedHandle { reason: String },

    /// Encoding a delete action into its bulk line failed.
    #[error("Serialization error: {context}")]
    Serialize { context: String },

    /// The request to the cluster failed entirely (connect, timeout, 5xx).
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// The cluster response could not be interpreted.
    #[error("Malformed response: {context}")]
    MalformedResponse { context: String },

    /// One or more items of a chunk failed and item errors are not
    /// suppressed.
    #[error("{failed} document(s) failed to delete, first failure: {first}")]
    BulkItems { failed: usize, first: String },

    /// Internal channel send/receive failure (e.g., closed channel or a
    /// worker that dropped its task).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The worker pool is shutting down and refuses new work.
    #[error("Worker pool is shutting down")]
    ServiceShutdown,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize {
            context: err.to_string(),
        }
    }
}

impl Error {
    /// Returns `true` for errors raised by a single chunk execution, as
    /// opposed to errors that abort the run before any chunk is submitted.
    pub const fn is_task_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::MalformedResponse { .. }
                | Self::BulkItems { .. }
                | Self::ChannelError { .. }
        )
    }
}
