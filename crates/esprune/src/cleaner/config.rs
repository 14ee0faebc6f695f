use anyhow::{Context, bail};
use clap::{ArgAction, Parser, ValueEnum};
use core::time::Duration;
use esprune_core::{
    ChunkLimits,
    types::{
        BulkOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_BYTES, DEFAULT_PROGRESS_EVERY,
        DEFAULT_WORKERS,
    },
};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CLUSTER: &str = "http://localhost:9200";
const DEFAULT_FIELD: &str = "@timestamp";
const DEFAULT_SCROLL_SIZE: usize = 1_000;
const DEFAULT_SCROLL_KEEPALIVE: &str = "5m";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 3;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime configuration for the `esprune` binary.
///
/// Every setting can come from a CLI flag, an environment variable (a `.env`
/// file in the working directory is loaded first) or a TOML file given with
/// `--config`. Flags win over the environment, which wins over the file;
/// anything left unset falls back to a built-in default.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "esprune",
    version,
    about = "Deletes documents older than a retention threshold from an Elasticsearch index"
)]
pub struct CliArgs {
    /// Path to a TOML configuration file.
    ///
    /// Environment variable: `ESPRUNE_CONFIG`
    #[arg(short, long, env = "ESPRUNE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma separated list of cluster node URLs.
    ///
    /// Requests are spread round-robin over the nodes.
    ///
    /// Environment variable: `ES_CLUSTER`
    #[arg(long, env = "ES_CLUSTER")]
    pub cluster: Option<String>,

    /// Index (or index pattern) to clean.
    ///
    /// Environment variable: `ES_INDEX`
    #[arg(short, long, env = "ES_INDEX")]
    pub index: Option<String>,

    /// Date field compared against the retention threshold.
    ///
    /// Environment variable: `ES_FIELD`
    #[arg(short, long, env = "ES_FIELD")]
    pub field: Option<String>,

    /// Documents whose date field is older than this many years are deleted.
    ///
    /// Environment variable: `RETENTION_YEARS`
    #[arg(short, long, env = "RETENTION_YEARS")]
    pub years: Option<u32>,

    /// Number of bulk requests allowed in flight at once.
    ///
    /// At most `workers + 1` chunks are buffered between the scan and the
    /// cluster, which bounds memory use regardless of index size.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(short, long, env = "NUM_WORKERS")]
    pub workers: Option<usize>,

    /// Maximum number of delete actions per bulk request.
    ///
    /// Environment variable: `CHUNK_SIZE`
    #[arg(long, env = "CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Maximum serialized size of a bulk request body, in bytes.
    ///
    /// A single action larger than this is still sent, alone.
    ///
    /// Environment variable: `MAX_CHUNK_BYTES`
    #[arg(long, env = "MAX_CHUNK_BYTES")]
    pub max_chunk_bytes: Option<usize>,

    /// Hits fetched per scroll page.
    ///
    /// Environment variable: `SCROLL_SIZE`
    #[arg(long, env = "SCROLL_SIZE")]
    pub scroll_size: Option<usize>,

    /// How long the cluster keeps the scroll context alive between pages
    /// (e.g. `30s`, `5m`).
    ///
    /// Environment variable: `SCROLL_KEEPALIVE`
    #[arg(long, env = "SCROLL_KEEPALIVE")]
    pub scroll_keepalive: Option<String>,

    /// Timeout applied to every HTTP request, in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Log verbosity (`trace`, `debug`, `info`, `warn`, `error`). `RUST_LOG`
    /// takes precedence when set.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Successful deletions between progress log lines; `0` disables them.
    ///
    /// Environment variable: `PROGRESS_EVERY`
    #[arg(long, env = "PROGRESS_EVERY")]
    pub progress_every: Option<u64>,

    /// Report documents the cluster refused to delete as failures instead of
    /// aborting the run.
    ///
    /// Environment variable: `SUPPRESS_ITEM_ERRORS`
    #[arg(long, env = "SUPPRESS_ITEM_ERRORS", action = ArgAction::Set)]
    pub suppress_item_errors: Option<bool>,

    /// Report every document of a failed bulk request as a failure instead
    /// of aborting the run.
    ///
    /// Environment variable: `SUPPRESS_TASK_ERRORS`
    #[arg(long, env = "SUPPRESS_TASK_ERRORS", action = ArgAction::Set)]
    pub suppress_task_errors: Option<bool>,

    /// Only count matching documents; delete nothing.
    ///
    /// Environment variable: `DRY_RUN`
    #[arg(long, env = "DRY_RUN", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: Option<bool>,

    /// Seconds to wait for each worker to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Cluster nodes as written in a config file: either a comma separated
/// string or an array of URLs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClusterSpec {
    Inline(String),
    List(Vec<String>),
}

impl ClusterSpec {
    fn into_nodes(self) -> Vec<String> {
        match self {
            Self::Inline(s) => s.split(',').map(str::to_owned).collect(),
            Self::List(nodes) => nodes,
        }
    }
}

/// Contents of the optional TOML configuration file.
///
/// Keys are the kebab-case flag names, e.g.
///
/// ```toml
/// cluster = ["http://es-1:9200", "http://es-2:9200"]
/// index = "logs-*"
/// years = 2
/// chunk-size = 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub cluster: Option<ClusterSpec>,
    pub index: Option<String>,
    pub field: Option<String>,
    pub years: Option<u32>,
    pub workers: Option<usize>,
    pub chunk_size: Option<usize>,
    pub max_chunk_bytes: Option<usize>,
    pub scroll_size: Option<usize>,
    pub scroll_keepalive: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub progress_every: Option<u64>,
    pub suppress_item_errors: Option<bool>,
    pub suppress_task_errors: Option<bool>,
    pub dry_run: Option<bool>,
    pub shutdown_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("cannot parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Validated settings for one retention run.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    pub nodes: Vec<Url>,
    pub index: String,
    pub field: String,
    pub years: u32,
    pub workers: usize,
    pub limits: ChunkLimits,
    pub scroll_size: usize,
    pub scroll_keepalive: String,
    pub request_timeout: Duration,
    pub progress_every: u64,
    pub bulk: BulkOptions,
    pub dry_run: bool,
    pub shutdown_timeout: Duration,
    pub telemetry: TelemetryConfig,
}

impl TryFrom<CliArgs> for CleanerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(args, file)
    }
}

impl CleanerConfig {
    /// Merges CLI/env values over file values over defaults and validates the
    /// result.
    pub fn from_sources(args: CliArgs, file: FileConfig) -> anyhow::Result<Self> {
        let defaults = BulkOptions::default();

        let cluster = args
            .cluster
            .map(ClusterSpec::Inline)
            .or(file.cluster)
            .unwrap_or_else(|| ClusterSpec::Inline(DEFAULT_CLUSTER.to_owned()));
        let nodes = parse_nodes(cluster)?;

        let Some(index) = args.index.or(file.index).filter(|i| !i.trim().is_empty()) else {
            bail!("ES_INDEX must be set");
        };

        let field = args
            .field
            .or(file.field)
            .unwrap_or_else(|| DEFAULT_FIELD.to_owned());
        if field.trim().is_empty() {
            bail!("ES_FIELD must not be empty");
        }

        let Some(years) = args.years.or(file.years) else {
            bail!("RETENTION_YEARS must be set");
        };
        if years == 0 {
            bail!("RETENTION_YEARS must be greater than 0");
        }

        let workers = args.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        let chunk_size = args
            .chunk_size
            .or(file.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let max_chunk_bytes = args
            .max_chunk_bytes
            .or(file.max_chunk_bytes)
            .unwrap_or(DEFAULT_MAX_CHUNK_BYTES);
        let limits = ChunkLimits::new(chunk_size, max_chunk_bytes)
            .context("CHUNK_SIZE and MAX_CHUNK_BYTES must be greater than 0")?;

        let scroll_size = args
            .scroll_size
            .or(file.scroll_size)
            .unwrap_or(DEFAULT_SCROLL_SIZE);
        if scroll_size == 0 {
            bail!("SCROLL_SIZE must be greater than 0");
        }

        let scroll_keepalive = args
            .scroll_keepalive
            .or(file.scroll_keepalive)
            .unwrap_or_else(|| DEFAULT_SCROLL_KEEPALIVE.to_owned());
        if !is_time_unit(&scroll_keepalive) {
            bail!("SCROLL_KEEPALIVE ({scroll_keepalive}) must look like `30s`, `5m` or `1h`");
        }

        let request_timeout_secs = args
            .request_timeout_secs
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        let log_level = args
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned())
            .to_ascii_lowercase();
        if !matches!(
            log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            bail!("LOG_LEVEL ({log_level}) must be one of trace, debug, info, warn, error");
        }

        Ok(Self {
            nodes,
            index,
            field,
            years,
            workers,
            limits,
            scroll_size,
            scroll_keepalive,
            request_timeout: Duration::from_secs(request_timeout_secs),
            progress_every: args
                .progress_every
                .or(file.progress_every)
                .unwrap_or(DEFAULT_PROGRESS_EVERY),
            bulk: BulkOptions {
                suppress_item_errors: args
                    .suppress_item_errors
                    .or(file.suppress_item_errors)
                    .unwrap_or(defaults.suppress_item_errors),
                suppress_task_errors: args
                    .suppress_task_errors
                    .or(file.suppress_task_errors)
                    .unwrap_or(defaults.suppress_task_errors),
            },
            dry_run: args.dry_run.or(file.dry_run).unwrap_or(false),
            shutdown_timeout: Duration::from_secs(
                args.shutdown_timeout_secs
                    .or(file.shutdown_timeout_secs)
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            ),
            telemetry: TelemetryConfig {
                log_level: if log_level == "warning" {
                    "warn".to_owned()
                } else {
                    log_level
                },
                log_format: args.log_format.or(file.log_format).unwrap_or_default(),
            },
        })
    }
}

fn parse_nodes(cluster: ClusterSpec) -> anyhow::Result<Vec<Url>> {
    let mut nodes = Vec::new();
    for raw in cluster.into_nodes() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let url = Url::parse(raw).with_context(|| format!("invalid cluster node URL `{raw}`"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("cluster node `{raw}` must use http or https");
        }
        nodes.push(url);
    }
    if nodes.is_empty() {
        bail!("ES_CLUSTER must name at least one node");
    }
    Ok(nodes)
}

/// Accepts the duration syntax of the search API (`500ms`, `30s`, `5m`, ...).
fn is_time_unit(value: &str) -> bool {
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0
        && matches!(
            &value[digits..],
            "d" | "h" | "m" | "s" | "ms" | "micros" | "nanos"
        )
}
