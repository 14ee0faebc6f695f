#![doc = include_str!("../README.md")]

mod cleaner;

use clap::Parser;
use cleaner::config::{CleanerConfig, CliArgs};
use cleaner::service::handler::{Outcome, RetentionJob};
use cleaner::telemetry::init_telemetry;
use esprune_core::RunStatus;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CleanerConfig::try_from(args)?;

    let providers = init_telemetry(&config.telemetry)?;

    let job = RetentionJob::new(config)?;
    log_startup_info(job.config());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let outcome = job.run(cancel).await;
    providers.shutdown();

    match outcome? {
        Outcome::Finished(summary) if summary.status == RunStatus::Cancelled => {
            anyhow::bail!(
                "run cancelled after deleting {} and failing {} documents from index {}",
                summary.deleted,
                summary.failed,
                summary.index
            )
        }
        Outcome::Finished(summary) => {
            tracing::debug!(processed = summary.processed(), "Run completed");
        }
        Outcome::NothingToDelete { total } => {
            tracing::debug!(total, "Run skipped");
        }
        Outcome::DryRun { total, matches } => {
            tracing::debug!(total, matches, "Dry run completed");
        }
    }
    Ok(())
}

fn log_startup_info(config: &CleanerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Loaded settings: {:#?}", config);
    } else {
        tracing::info!(
            index = %config.index,
            field = %config.field,
            years = config.years,
            workers = config.workers,
            chunk_size = config.limits.max_count(),
            dry_run = config.dry_run,
            "Loaded settings"
        );
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::warn!("Shutdown requested, finishing in-flight bulk requests...");
    cancel.cancel();
}
