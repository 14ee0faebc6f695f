//! # Shared pipeline types
//!
//! The values that flow between the stages of a retention run:
//!
//! - [`DocumentHandle`] - one hit produced by the index scan
//! - [`DeleteAction`] - the delete operation derived from a handle
//! - [`ResultRecord`] / [`ItemInfo`] - the per-item outcome reported by the
//!   bulk backend
//! - [`BulkOptions`] - which failure classes are reported as data rather than
//!   raised
//!
//! [`DeleteAction`] is the only type that crosses the wire; it serializes to
//! the action/metadata line of the bulk API.

use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default bulk item-count bound.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default bulk body-size bound (100 MiB).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

/// Default number of concurrent chunk executions.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of successful deletions between progress logs.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

/// A matched document as returned by the scan cursor.
///
/// Field names follow the hit metadata of the search API so that a hit can be
/// deserialized straight into a handle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentHandle {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
}

impl DocumentHandle {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            id: Some(id.into()),
            routing: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    #[must_use]
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }
}

/// A single delete operation destined for the bulk API.
///
/// Immutable once created; the serialized form is the bulk action line
/// `{"delete":{"_index":..,"_id":..}}` with `_type` and `routing` present only
/// when the source hit carried them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAction {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<String>,
    #[serde(rename = "_id")]
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<String>,
}

impl DeleteAction {
    pub fn new(
        index: impl Into<String>,
        doc_type: Option<String>,
        id: impl Into<String>,
        routing: Option<String>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type,
            id: id.into(),
            routing,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }
}

/// Which failure classes the bulk stage reports as data instead of raising.
///
/// - `suppress_item_errors`: a failed item becomes a `success == false`
///   record. When `false`, any failed item fails the whole chunk.
/// - `suppress_task_errors`: a failed chunk call becomes one failed record per
///   action. When `false`, the error aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOptions {
    pub suppress_item_errors: bool,
    pub suppress_task_errors: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            suppress_item_errors: true,
            suppress_task_errors: false,
        }
    }
}

/// Backend detail attached to every [`ResultRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub index: String,
    pub id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ItemInfo {
    /// Info for an item the backend acknowledged.
    pub fn acknowledged(action: &DeleteAction, status: u16, result: impl Into<String>) -> Self {
        Self {
            index: action.index().to_owned(),
            id: action.id().to_owned(),
            status,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Info for an item the backend rejected or never saw.
    pub fn rejected(action: &DeleteAction, status: u16, error: Value) -> Self {
        Self {
            index: action.index().to_owned(),
            id: action.id().to_owned(),
            status,
            result: None,
            error: Some(error),
        }
    }
}

impl fmt::Display for ItemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} status={}", self.index, self.id, self.status)?;
        if let Some(result) = &self.result {
            write!(f, " result={result}")?;
        }
        if let Some(error) = &self.error {
            write!(f, " error={error}")?;
        }
        Ok(())
    }
}

/// Outcome of one delete action, in the order the action appeared in its
/// chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub success: bool,
    pub info: ItemInfo,
}

impl ResultRecord {
    pub const fn ok(info: ItemInfo) -> Self {
        Self {
            success: true,
            info,
        }
    }

    pub const fn failed(info: ItemInfo) -> Self {
        Self {
            success: false,
            info,
        }
    }
}
