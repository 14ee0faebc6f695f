//! # Telemetry Features
//!
//! Logs always go to stdout through `tracing_subscriber::fmt`, either
//! human-readable (`pretty`) or one JSON object per line (`json`). The level
//! comes from `LOG_LEVEL` unless `RUST_LOG` is set, in which case the latter
//! wins.
//!
//! ## Feature matrix
//!
//! - `metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `stdout`: Exports metrics to stdout.
//! - `otlp`: Exports metrics over OTLP/HTTP. The collector endpoint is read
//!   from `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! Both exporters require `metrics`; they can be enabled together.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features metrics,stdout -- --index logs --years 2
//! ```

#[cfg(all(feature = "stdout", not(feature = "metrics")))]
compile_error!("The 'stdout' feature requires 'metrics' to be enabled.");

#[cfg(all(feature = "otlp", not(feature = "metrics")))]
compile_error!("The 'otlp' feature requires 'metrics' to be enabled.");

use super::config::{LogFormat, TelemetryConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// HTTP internals log every connection at debug.
const QUIET_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending metrics. Call once, right before exit.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryProviders> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(&config.log_level)))?;

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                    .with_file(true)
                    .pretty(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                    .json()
                    .with_current_span(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    #[cfg(feature = "metrics")]
    let meter_provider = {
        let provider = init_metrics()?;
        opentelemetry::global::set_meter_provider(provider.clone());
        let scope = InstrumentationScope::builder("esprune")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
        provider
    };

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

fn directives(level: &str) -> String {
    core::iter::once(level.to_owned())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("esprune")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;
        use opentelemetry_otlp::{Protocol, WithExportConfig};

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static DOCUMENTS_DELETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DOCUMENTS_FAILED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CHUNKS_SUBMITTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CHUNKS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CHUNK_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = DOCUMENTS_DELETED.set(
        meter
            .u64_counter("documents_deleted")
            .with_description("Documents the cluster acknowledged as deleted")
            .build(),
    );

    let _ = DOCUMENTS_FAILED.set(
        meter
            .u64_counter("documents_failed")
            .with_description("Documents that could not be deleted")
            .build(),
    );

    let _ = CHUNKS_SUBMITTED.set(
        meter
            .u64_counter("chunks_submitted")
            .with_description("Bulk requests sent")
            .build(),
    );

    let _ = CHUNKS_INFLIGHT.set(
        meter
            .i64_up_down_counter("chunks_inflight")
            .with_description("Bulk requests awaiting a response")
            .build(),
    );

    let _ = CHUNK_DURATION_MS.set(
        meter
            .f64_histogram("chunk_duration")
            .with_unit("ms")
            .with_description("Bulk request round-trip time")
            .build(),
    );
}

// No-ops unless the `metrics` feature is enabled.
#[cfg(feature = "metrics")]
pub fn increment_documents_deleted(count: u64) {
    if let Some(counter) = DOCUMENTS_DELETED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_documents_deleted(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_documents_failed(count: u64) {
    if let Some(counter) = DOCUMENTS_FAILED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_documents_failed(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_chunks_submitted() {
    if let Some(counter) = CHUNKS_SUBMITTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_chunks_submitted() {}

#[cfg(feature = "metrics")]
pub fn increment_chunks_inflight() {
    if let Some(counter) = CHUNKS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_chunks_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_chunks_inflight() {
    if let Some(counter) = CHUNKS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_chunks_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_chunk_duration(duration_ms: f64) {
    if let Some(histogram) = CHUNK_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_chunk_duration(_duration_ms: f64) {}
