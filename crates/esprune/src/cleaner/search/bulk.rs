use super::client::SearchClient;
use crate::cleaner::telemetry::{
    decrement_chunks_inflight, increment_chunks_inflight, increment_chunks_submitted,
    record_chunk_duration,
};
use esprune_core::{
    Chunk, ChunkExecutor, Error, Result, async_trait,
    types::{DeleteAction, ItemInfo, ResultRecord},
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Status assumed for an item the cluster returned without one.
const MISSING_STATUS: u16 = 500;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default = "missing_status")]
    status: u16,
    result: Option<String>,
    error: Option<Value>,
}

const fn missing_status() -> u16 {
    MISSING_STATUS
}

/// [`ChunkExecutor`] backed by the `_bulk` endpoint.
#[derive(Debug, Clone)]
pub struct BulkClient {
    client: SearchClient,
}

impl BulkClient {
    pub const fn new(client: SearchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChunkExecutor for BulkClient {
    async fn execute(&self, chunk: &Chunk) -> Result<Vec<ResultRecord>> {
        increment_chunks_submitted();
        increment_chunks_inflight();
        let start = Instant::now();

        let response = self
            .client
            .post_ndjson::<BulkResponse>("_bulk", chunk.body().clone())
            .await;

        decrement_chunks_inflight();
        record_chunk_duration(start.elapsed().as_secs_f64() * 1_000.0);

        let response = response?;
        tracing::debug!(
            sequence = chunk.sequence(),
            actions = chunk.len(),
            bytes = chunk.size_bytes(),
            took_ms = response.took,
            errors = response.errors,
            "Bulk request completed"
        );

        if response.items.len() != chunk.len() {
            return Err(Error::MalformedResponse {
                context: format!(
                    "bulk response for chunk {} has {} items, expected {}",
                    chunk.sequence(),
                    response.items.len(),
                    chunk.len()
                ),
            });
        }

        chunk
            .actions()
            .iter()
            .zip(response.items)
            .map(|(action, item)| to_record(action, item))
            .collect()
    }
}

fn to_record(action: &DeleteAction, mut item: BTreeMap<String, BulkItem>) -> Result<ResultRecord> {
    let Some(item) = item.remove("delete") else {
        return Err(Error::MalformedResponse {
            context: format!(
                "bulk item for {}/{} is not a delete result",
                action.index(),
                action.id()
            ),
        });
    };

    let info = ItemInfo {
        index: item.index.unwrap_or_else(|| action.index().to_owned()),
        id: item.id.unwrap_or_else(|| action.id().to_owned()),
        status: item.status,
        result: item.result,
        error: item.error,
    };

    Ok(if (200..300).contains(&item.status) {
        ResultRecord::ok(info)
    } else {
        ResultRecord::failed(info)
    })
}
