use bytes::Bytes;
use core::time::Duration;
use esprune_core::{Error, Result, types::DocumentHandle};
use futures::{Stream, TryStreamExt, stream};
use portable_atomic::{AtomicUsize, Ordering};
use reqwest::{Method, RequestBuilder, Url, header::CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::sync::Arc;

const ERROR_BODY_LIMIT: usize = 512;

/// Thin HTTP client for the handful of cluster endpoints a retention run
/// needs.
///
/// Requests rotate over the configured nodes. Cloning is cheap and clones
/// share the rotation.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    nodes: Arc<[Url]>,
    next_node: Arc<AtomicUsize>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ScrollPage {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(rename = "_shards")]
    shards: Option<Shards>,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<DocumentHandle>,
}

#[derive(Debug, Deserialize)]
struct Shards {
    total: u64,
    successful: u64,
    #[serde(default)]
    skipped: u64,
}

impl ScrollPage {
    fn check_shards(&self) -> Result<()> {
        match &self.shards {
            Some(s) if s.successful + s.skipped < s.total => Err(Error::Transport {
                context: format!(
                    "scroll page answered by {} of {} shards",
                    s.successful + s.skipped,
                    s.total
                ),
            }),
            _ => Ok(()),
        }
    }
}

enum Cursor {
    Start { path: String, body: Value },
    Next(String),
    Done,
}

impl SearchClient {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `nodes` is empty or the HTTP
    /// client cannot be built.
    pub fn new(nodes: Vec<Url>, timeout: Duration) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "at least one cluster node is required".into(),
            });
        }

        let nodes = nodes
            .into_iter()
            .map(|mut url| {
                // `Url::join` replaces the last segment unless the base ends in '/'.
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                url
            })
            .collect();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("esprune/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig {
                reason: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            nodes,
            next_node: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn nodes(&self) -> &[Url] {
        &self.nodes
    }

    /// Number of documents of `index` matching `query`.
    pub async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let request = self
            .request(Method::POST, &format!("{index}/_count"))?
            .json(&json!({ "query": query }));
        let response: CountResponse = send(request).await?;
        Ok(response.count)
    }

    /// Streams every document of `index` matching `query` through a scroll
    /// cursor.
    ///
    /// Pages of `page_size` hits are fetched lazily as the stream is polled,
    /// sorted by `_doc` and without `_source`. The scroll context is cleared
    /// once the last page has been read; a stream dropped early leaves it to
    /// expire after `keepalive`. The first error ends the stream.
    pub fn scan(
        &self,
        index: &str,
        query: &Value,
        page_size: usize,
        keepalive: &str,
    ) -> impl Stream<Item = Result<DocumentHandle>> + Send + 'static {
        let client = self.clone();
        let keepalive = keepalive.to_owned();
        let start = Cursor::Start {
            path: format!("{index}/_search?scroll={keepalive}"),
            body: json!({
                "query": query,
                "size": page_size,
                "sort": ["_doc"],
                "_source": false,
            }),
        };

        stream::try_unfold(start, move |cursor| {
            client.clone().next_page(cursor, keepalive.clone())
        })
        .map_ok(|hits| stream::iter(hits.into_iter().map(Ok)))
        .try_flatten()
    }

    async fn next_page(
        self,
        cursor: Cursor,
        keepalive: String,
    ) -> Result<Option<(Vec<DocumentHandle>, Cursor)>> {
        let request = match cursor {
            Cursor::Start { path, body } => self.request(Method::POST, &path)?.json(&body),
            Cursor::Next(scroll_id) => self
                .request(Method::POST, "_search/scroll")?
                .json(&json!({ "scroll": keepalive, "scroll_id": scroll_id })),
            Cursor::Done => return Ok(None),
        };

        let page: ScrollPage = send(request).await?;
        page.check_shards()?;

        let ScrollPage {
            scroll_id, hits, ..
        } = page;
        if hits.hits.is_empty() {
            if let Some(scroll_id) = scroll_id {
                self.clear_scroll(&scroll_id).await;
            }
            return Ok(None);
        }

        tracing::trace!(hits = hits.hits.len(), "Fetched scroll page");
        let next = scroll_id.map_or(Cursor::Done, Cursor::Next);
        Ok(Some((hits.hits, next)))
    }

    /// Posts a newline-delimited body, as the bulk API expects.
    pub(crate) async fn post_ndjson<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Bytes,
    ) -> Result<T> {
        let request = self
            .request(Method::POST, path)?
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        send(request).await
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let Ok(request) = self.request(Method::DELETE, "_search/scroll") else {
            return;
        };
        let request = request.json(&json!({ "scroll_id": [scroll_id] }));
        if let Err(e) = send::<Value>(request).await {
            tracing::debug!(error = %e, "Failed to clear scroll context");
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let node = &self.nodes[self.next_node.fetch_add(1, Ordering::Relaxed) % self.nodes.len()];
        let url = node.join(path).map_err(|e| Error::InvalidConfig {
            reason: format!("cannot build URL for `{path}` on {node}: {e}"),
        })?;
        Ok(self.http.request(method, url))
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(|e| Error::Transport {
        context: e.to_string(),
    })?;

    let status = response.status();
    let url = response.url().clone();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Transport {
            context: format!(
                "{url} returned {status}: {}",
                body.chars().take(ERROR_BODY_LIMIT).collect::<String>()
            ),
        });
    }

    response.json().await.map_err(|e| Error::MalformedResponse {
        context: format!("{url}: {e}"),
    })
}
